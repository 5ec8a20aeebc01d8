use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_port() -> u16 {
    8018
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Credential rotation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Number of slots in the persisted pool.
    pub slot_count: usize,
    /// Upper bound on attempts within one rotated call.
    pub max_attempts: usize,
    /// Cooldown after a 429 / quota error.
    pub rate_limited_cooldown_secs: u64,
    /// Cooldown after a 401/403 / invalid key.
    pub invalid_credential_cooldown_secs: u64,
    /// Cooldown after a 500/503 / timeout.
    pub transient_cooldown_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            slot_count: 5,
            max_attempts: 5,
            rate_limited_cooldown_secs: 10 * 60,
            invalid_credential_cooldown_secs: 30 * 60,
            transient_cooldown_secs: 20,
        }
    }
}

/// In-place retry of a single upstream call on 500/503.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each one.
    pub initial_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 1200,
        }
    }
}

impl BackoffConfig {
    /// Returns the initial delay as a [`Duration`].
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Generative API endpoint and model names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    /// Tried once when the image model returns no inline image.
    pub image_fallback_model: String,
    pub tts_model: String,
    /// Model used by the key probe.
    pub ping_model: String,
    /// Voice used by the single-voice TTS route when none is requested.
    pub default_voice: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            text_model: "gemini-3-flash-preview".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            image_fallback_model: "gemini-3-pro-image-preview".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            ping_model: "gemini-2.5-flash".to_string(),
            default_voice: "Kore".to_string(),
        }
    }
}

/// Voice candidates for the narration route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub female: Vec<String>,
    pub male: Vec<String>,
    /// Voice of the final attempt after every combination failed.
    pub last_resort: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let names = |v: &[&str]| v.iter().map(ToString::to_string).collect();
        Self {
            female: names(&["Algenib", "Aoede", "Callisto", "Nashira", "Sirius"]),
            male: names(&["Orion", "Puck", "Achernar", "Rigel", "Vega"]),
            last_resort: "Algenib".to_string(),
        }
    }
}

/// Image-recipe API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeConfig {
    pub base_url: String,
    /// How long a saved bearer token is kept.
    pub token_ttl_secs: u64,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aisandbox-pa.googleapis.com".to_string(),
            token_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8018).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// `SQLite` database path (defaults to `~/.yoso/yoso.db`).
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub voices: VoiceConfig,
    #[serde(default)]
    pub recipe: RecipeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            db_path: None,
            rotation: RotationConfig::default(),
            backoff: BackoffConfig::default(),
            gemini: GeminiConfig::default(),
            voices: VoiceConfig::default(),
            recipe: RecipeConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults and then
    /// with `YOSO_`-prefixed environment variables (`YOSO_ROTATION__MAX_ATTEMPTS=3`).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("YOSO_").split("__"))
            .extract()
    }

    /// Loads defaults merged with `YOSO_`-prefixed environment variables only.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if an environment value has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Serialized},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("YOSO_").split("__"))
            .extract()
    }

    /// Returns the voice candidates for `"male"`; anything else selects the female list.
    #[must_use]
    pub fn voice_candidates(&self, gender: &str) -> &[String] {
        if gender.eq_ignore_ascii_case("male") {
            &self.voices.male
        } else {
            &self.voices.female
        }
    }
}

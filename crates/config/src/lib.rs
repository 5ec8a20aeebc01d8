//! Configuration loading and hot-reloading for the yoso gateway.
//!
//! Uses figment for YAML-based configuration with sensible defaults and
//! `YOSO_`-prefixed environment overrides, and notify + arc-swap for live
//! file watching.

pub mod schema;
pub mod watcher;

pub use schema::{
    BackoffConfig, Config, GeminiConfig, LogConfig, LogFormat, RecipeConfig, RotationConfig,
    VoiceConfig,
};
pub use watcher::ConfigWatcher;

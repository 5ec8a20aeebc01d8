//! Upstream clients and the credential rotation core.
//!
//! [`RotationExecutor`] drives a call across the credential slot pool,
//! [`MultiAxisLoop`] adds a secondary parameter axis over the same slots, and [`Backoff`] retries a single call on server-side transients.
//! [`GeminiClient`] and [`RecipeClient`] are the two upstream surfaces.

pub mod backoff;
pub mod classify;
pub mod clock;
pub mod fallback;
pub mod gemini;
pub mod http_util;
pub mod recipe;
pub mod retry;
pub mod routing;

pub use backoff::{Backoff, retry_transient};
pub use classify::{classify, is_voice_rejection};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::{AttemptStage, AxisSuccess, MultiAxisLoop};
pub use gemini::{GeminiClient, InlineData};
pub use http_util::UpstreamHttp;
pub use recipe::{RecipeClient, RecipeMode};
pub use retry::{Rotated, RotationExecutor, RotationPolicy};
pub use routing::{Selection, pick_ready};

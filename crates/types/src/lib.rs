//! Core types and traits for the yoso workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gateway: the unified error type, the credential slot data model with its
//! failure classes, and the async traits implemented by the persistence and
//! upstream collaborators.

pub mod error;
pub mod slot;
pub mod traits;

pub use error::YosoError;
pub use slot::{CredentialSlot, FailureClass, SlotId, SlotLease, Timestamp, now_ms};
pub use traits::{GenerativeApi, KvStore, RecipeApi};

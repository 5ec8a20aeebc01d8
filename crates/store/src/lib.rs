//! Persistence backends and the stores built on top of them.
//!
//! Provides an in-memory key-value store for testing, a SQLite-backed one for
//! production, the credential [`SlotStore`] and the recipe [`TokenStore`].

pub mod memory;
pub mod slots;
pub mod sqlite;
pub mod token;

pub use memory::InMemoryKvStore;
pub use slots::{DEFAULT_SLOT_COUNT, SLOTS_KEY, SlotStore, clear_slots, default_slots};
pub use sqlite::SqliteKvStore;
pub use token::{RecipeToken, TokenStatus, TokenStore, normalize_bearer};

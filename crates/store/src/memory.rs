//! In-memory key-value store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use yoso_types::{KvStore, traits::Result};

/// An in-memory [`KvStore`] implementation for testing and ephemeral use.
pub struct InMemoryKvStore {
    /// Key-value map.
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryKvStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    /// Loads the value for `key`, if present.
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    /// Saves (or overwrites) the value for `key`.
    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Removes `key`.
    async fn remove(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryKvStore::new();
        store.save("slots", "[]").await.unwrap();
        assert_eq!(store.load("slots").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemoryKvStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryKvStore::new();
        store.save("k", "v").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.load("k").await.unwrap().is_none());
        // Removing again is fine.
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryKvStore::new();
        store.save("k", "first").await.unwrap();
        store.save("k", "second").await.unwrap();
        assert_eq!(store.load("k").await.unwrap().as_deref(), Some("second"));
    }
}

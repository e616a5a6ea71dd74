use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Async key/value store holding JSON values.
///
/// `put` replaces the whole value under a key; there is no partial update.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value under `key`.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

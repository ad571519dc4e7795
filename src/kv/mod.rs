//! Key-Value storage boundary
//!
//! Assignments cross this boundary on their way to the external persistence
//! layer. The one coordination primitive the core relies on is a uniqueness
//! constraint: [`KvStore::insert_unique`] must refuse to overwrite an existing
//! key, which is how concurrent first-touch writers converge on one variant.
//!
//! # Example
//!
//! ```rust
//! use trueno_adapt::kv::{KvStore, MemoryKvStore};
//! use trueno_adapt::Error;
//!
//! # async fn example() -> trueno_adapt::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.insert_unique("key", b"first".to_vec()).await?;
//! let second = store.insert_unique("key", b"second".to_vec()).await;
//! assert!(matches!(second, Err(Error::UniqueViolation(_))));
//! assert_eq!(store.get("key").await?, Some(b"first".to_vec()));
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;

/// Key-value store with insert-once semantics.
///
/// Implementations backed by a database map `insert_unique` onto a unique
/// index and translate the driver's violation into
/// [`Error::UniqueViolation`](crate::Error::UniqueViolation).
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Insert a value if the key is absent.
    ///
    /// Fails with `UniqueViolation` if the key already exists; the stored
    /// value is left untouched.
    fn insert_unique(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }
}

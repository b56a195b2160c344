//! Key-value persistence backends.
//!
//! The session store talks to storage only through [`KeyValueStore`]:
//! `get`, `set` and prefix-filtered `keys`. Two implementations ship with
//! the crate:
//!
//! - [`SqliteStore`]: durable, one row per key, migrations embedded
//! - [`MemoryStore`]: process-local map, used by tests and the `memory`
//!   backend

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;

/// A shared string-keyed namespace of string values.
///
/// Implementations must make `set` an idempotent overwrite and must return
/// `keys` in lexicographic order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// List every key starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

#[async_trait]
impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).keys(prefix).await
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The key/value storage abstraction the execution engine runs against, with
//! in-memory implementations: a sharded ordered map for mutable layers, a
//! bounded MRU cache for read-through layers, and the durable backend
//! boundary.

pub mod backend;
pub mod cache_storage;
pub mod error;
pub mod memory_storage;

pub use backend::{BackendStorage, InMemoryBackend, WriteBatch, WriteOp};
pub use cache_storage::CacheStorage;
pub use error::StorageError;
pub use memory_storage::MemoryStorage;

use basalt_types::{Entry, StateKey, StateKeyPrefix};
use std::sync::Arc;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// The minimal storage contract: point reads and writes keyed by
/// [`StateKey`], plus ordered prefix scans.
///
/// All operations take `&self`; implementations provide their own interior
/// mutability so views compose freely across worker threads. `remove`
/// semantics are the implementation's business: plain maps erase the entry,
/// layered views write a tombstone instead.
pub trait StateStorage: Send + Sync {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>>;

    fn read_batch(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>> {
        keys.iter().map(|key| self.read(key)).collect()
    }

    /// Read without side effects in tracking wrappers. Used for internal
    /// bookkeeping reads (undo-log priors) that must not enter a read set.
    fn read_untracked(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.read(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()>;

    fn remove(&self, key: &StateKey) -> Result<()>;

    /// All live entries matching `prefix`, sorted by key.
    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>>;
}

impl<S: StateStorage + ?Sized> StateStorage for &S {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        (**self).read(key)
    }

    fn read_batch(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>> {
        (**self).read_batch(keys)
    }

    fn read_untracked(&self, key: &StateKey) -> Result<Option<Entry>> {
        (**self).read_untracked(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        (**self).write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        (**self).remove(key)
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        (**self).scan_prefix(prefix)
    }
}

impl<S: StateStorage + ?Sized> StateStorage for Arc<S> {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        (**self).read(key)
    }

    fn read_batch(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>> {
        (**self).read_batch(keys)
    }

    fn read_untracked(&self, key: &StateKey) -> Result<Option<Entry>> {
        (**self).read_untracked(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        (**self).write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        (**self).remove(key)
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        (**self).scan_prefix(prefix)
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use basalt_state_storage::{Result, StateStorage};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use parking_lot::Mutex;
use roaring::RoaringBitmap;

/// Wraps a storage and records which keys the wrapped view read and wrote,
/// as roaring bitmaps over 32-bit key hashes.
///
/// Membership is approximate: a hash collision can make two disjoint key
/// sets intersect, which only costs a spurious retry. A tracked access can
/// never be missed, so conflicts are never silently dropped.
pub struct ReadWriteSetStorage<S> {
    storage: S,
    read_set: Mutex<RoaringBitmap>,
    write_set: Mutex<RoaringBitmap>,
}

impl<S> ReadWriteSetStorage<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            read_set: Mutex::new(RoaringBitmap::new()),
            write_set: Mutex::new(RoaringBitmap::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn record(&self, write: bool, key: &StateKey) {
        let hash = key.hash32();
        if write {
            self.write_set.lock().insert(hash);
        } else {
            self.read_set.lock().insert(hash);
        }
    }

    /// Read-after-write hazard test: does *our* write set intersect the
    /// *other* context's read set? The parallel scheduler calls this on the
    /// accumulated committed write set, with a later chunk as `other`.
    pub fn has_raw_intersection<T>(&self, other: &ReadWriteSetStorage<T>) -> bool {
        !self
            .write_set
            .lock()
            .is_disjoint(&other.read_set.lock())
    }

    /// Unions `other`'s write set into ours. Accumulates the "all writes so
    /// far" set across validated chunks.
    pub fn merge_write_set<T>(&self, other: &ReadWriteSetStorage<T>) {
        *self.write_set.lock() |= &*other.write_set.lock();
    }

    pub fn read_set_len(&self) -> u64 {
        self.read_set.lock().len()
    }

    pub fn write_set_len(&self) -> u64 {
        self.write_set.lock().len()
    }
}

impl<S: StateStorage> StateStorage for ReadWriteSetStorage<S> {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.record(false, key);
        self.storage.read(key)
    }

    fn read_batch(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>> {
        for key in keys {
            self.record(false, key);
        }
        self.storage.read_batch(keys)
    }

    /// Bookkeeping reads bypass the read set.
    fn read_untracked(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.storage.read_untracked(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        self.record(true, &key);
        self.storage.write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        self.record(true, key);
        self.storage.remove(key)
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        let entries = self.storage.scan_prefix(prefix)?;
        // Every key the scan surfaced is a read this context depends on.
        for (key, _) in &entries {
            self.record(false, key);
        }
        Ok(entries)
    }
}

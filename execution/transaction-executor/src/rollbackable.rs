// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use basalt_state_storage::{Result, StateStorage, StorageError};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use parking_lot::Mutex;

/// A savepoint is the undo-log length at the moment it was taken.
pub type Savepoint = usize;

struct UndoRecord {
    key: StateKey,
    prior: Option<Entry>,
}

/// Wraps a storage and records, before every write or remove, the key's prior
/// value (or its absence), so execution can be unwound to any earlier
/// savepoint.
///
/// Prior values are read with `read_untracked`: the lookup is bookkeeping and
/// must not enter any read set maintained by the wrapped storage, and it goes
/// straight to the storage rather than through the undo log itself.
pub struct Rollbackable<S> {
    storage: S,
    records: Mutex<Vec<UndoRecord>>,
}

impl<S: StateStorage> Rollbackable<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn current_savepoint(&self) -> Savepoint {
        self.records.lock().len()
    }

    /// Unwinds the undo log back to `savepoint`: each record past it is
    /// popped and its prior value re-applied (a remove, if there was none).
    /// A no-op when `savepoint` is the current log length; a savepoint past
    /// the log length is a caller error.
    pub fn rollback(&self, savepoint: Savepoint) -> Result<()> {
        let mut records = self.records.lock();
        if savepoint > records.len() {
            return Err(StorageError::InvalidSavepoint {
                savepoint,
                log_len: records.len(),
            });
        }
        while records.len() > savepoint {
            let Some(record) = records.pop() else {
                break;
            };
            match record.prior {
                Some(entry) => self.storage.write(record.key, entry)?,
                None => self.storage.remove(&record.key)?,
            }
        }
        Ok(())
    }
}

impl<S: StateStorage> StateStorage for Rollbackable<S> {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.storage.read(key)
    }

    fn read_batch(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>> {
        self.storage.read_batch(keys)
    }

    fn read_untracked(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.storage.read_untracked(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        let prior = self.storage.read_untracked(&key)?;
        self.records.lock().push(UndoRecord {
            key: key.clone(),
            prior,
        });
        self.storage.write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        let prior = self.storage.read_untracked(key)?;
        self.records.lock().push(UndoRecord {
            key: key.clone(),
            prior,
        });
        self.storage.remove(key)
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        self.storage.scan_prefix(prefix)
    }
}

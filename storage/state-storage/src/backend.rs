// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{memory_storage::MemoryStorage, Result, StateStorage, StorageError};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use parking_lot::Mutex;

/// One mutation bound for the durable store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteOp {
    Put(StateKey, Entry),
    Delete(StateKey),
}

/// An ordered batch of backend mutations, produced by the layer-merge step.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: StateKey, entry: Entry) {
        self.ops.push(WriteOp::Put(key, entry));
    }

    pub fn delete(&mut self, key: StateKey) {
        self.ops.push(WriteOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// The durable storage boundary. Only the serialized layer-merge step talks
/// to it.
///
/// Backends that cross a process boundary implement the two-phase hooks:
/// `prepare` stages a batch, `commit` makes it visible, `rollback` discards
/// it. The default implementations degrade to single-phase — `prepare`
/// applies the batch immediately and `commit` is a no-op — so local backends
/// only need `write_batch`.
pub trait BackendStorage: StateStorage {
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    fn prepare(&self, batch: WriteBatch) -> Result<()> {
        self.write_batch(batch)
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        Err(StorageError::Backend(
            "backend does not support two-phase rollback".into(),
        ))
    }
}

impl<T: BackendStorage + ?Sized> BackendStorage for &T {
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn prepare(&self, batch: WriteBatch) -> Result<()> {
        (**self).prepare(batch)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}

impl<T: BackendStorage + ?Sized> BackendStorage for std::sync::Arc<T> {
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn prepare(&self, batch: WriteBatch) -> Result<()> {
        (**self).prepare(batch)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}

/// Reference backend: a [`MemoryStorage`] plus a staged-batch slot so the
/// two-phase path is exercisable in tests.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: MemoryStorage,
    staged: Mutex<Option<WriteBatch>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        for op in batch.into_ops() {
            match op {
                WriteOp::Put(key, entry) => self.inner.write(key, entry)?,
                WriteOp::Delete(key) => self.inner.remove(&key)?,
            }
        }
        Ok(())
    }
}

impl StateStorage for InMemoryBackend {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        self.inner.read(key)
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        self.inner.write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        self.inner.remove(key)
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        self.inner.scan_prefix(prefix)
    }
}

impl BackendStorage for InMemoryBackend {
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.apply(batch)
    }

    fn prepare(&self, batch: WriteBatch) -> Result<()> {
        let mut staged = self.staged.lock();
        if staged.is_some() {
            return Err(StorageError::Backend(
                "a batch is already prepared".into(),
            ));
        }
        *staged = Some(batch);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let batch = self
            .staged
            .lock()
            .take()
            .ok_or_else(|| StorageError::Backend("no prepared batch to commit".into()))?;
        self.apply(batch)
    }

    fn rollback(&self) -> Result<()> {
        self.staged.lock().take();
        Ok(())
    }
}

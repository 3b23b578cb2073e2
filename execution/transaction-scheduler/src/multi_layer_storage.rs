// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use basalt_state_storage::{
    BackendStorage, CacheStorage, MemoryStorage, Result, StateStorage, StorageError, WriteBatch,
};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use tracing::debug;

/// Copy-on-write snapshot storage: one exclusively-owned mutable layer, a
/// chain of shared read-only layers (newest first), an optional MRU cache and
/// a backend.
///
/// Reads resolve top-down and stop at the first layer that knows the key — a
/// tombstone is a terminal "absent", it does not fall through to older
/// layers. Writes and removes only ever touch the mutable layer. `fork`
/// shares the immutable chain and backend without copying, which is what lets
/// the parallel scheduler hand every chunk its own private view for free.
///
/// The backend may itself be another `MultiLayerStorage` (chunk views layer
/// over the pass view this way); only the outermost instance, whose backend
/// implements [`BackendStorage`], can merge layers down to durable storage.
pub struct MultiLayerStorage<B> {
    mutable: RwLock<Option<Arc<MemoryStorage>>>,
    /// Front = newest.
    immutables: Mutex<VecDeque<Arc<MemoryStorage>>>,
    cache: Option<Arc<CacheStorage>>,
    backend: B,
    merge_lock: Mutex<()>,
}

impl<B: StateStorage> MultiLayerStorage<B> {
    pub fn new(backend: B) -> Self {
        Self {
            mutable: RwLock::new(None),
            immutables: Mutex::new(VecDeque::new()),
            cache: None,
            backend,
            merge_lock: Mutex::new(()),
        }
    }

    /// Installs a read-through MRU cache between the immutable chain and the
    /// backend.
    pub fn with_cache(mut self, cache: Arc<CacheStorage>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates the mutable layer. One at a time: forking while a mutable
    /// layer exists is fine, stacking two is not.
    pub fn new_mutable(&self) -> Result<()> {
        let mut mutable = self.mutable.write();
        if mutable.is_some() {
            return Err(StorageError::DuplicateMutableLayer);
        }
        *mutable = Some(Arc::new(MemoryStorage::new()));
        Ok(())
    }

    pub fn mutable_storage(&self) -> Option<Arc<MemoryStorage>> {
        self.mutable.read().clone()
    }

    /// Detaches and returns the mutable layer.
    pub fn take_mutable(&self) -> Result<Arc<MemoryStorage>> {
        self.mutable
            .write()
            .take()
            .ok_or(StorageError::NoMutableLayer)
    }

    /// Freezes the mutable layer as the newest immutable layer.
    pub fn push_mutable_to_front(&self) -> Result<()> {
        let layer = self.take_mutable()?;
        self.immutables.lock().push_front(layer);
        Ok(())
    }

    pub fn pop_immutable_front(&self) -> Result<Arc<MemoryStorage>> {
        self.immutables
            .lock()
            .pop_front()
            .ok_or(StorageError::NoImmutableLayer)
    }

    pub fn immutable_count(&self) -> usize {
        self.immutables.lock().len()
    }

    fn immutable_snapshot(&self) -> Vec<Arc<MemoryStorage>> {
        self.immutables.lock().iter().cloned().collect()
    }

    fn resolve(entry: Entry) -> Option<Entry> {
        if entry.is_deleted() {
            None
        } else {
            Some(entry)
        }
    }
}

impl<B: StateStorage + Clone> MultiLayerStorage<B> {
    /// O(1) snapshot view: shares the immutable chain, cache and backend;
    /// the mutable layer is fresh (or absent). No data is copied.
    pub fn fork(&self, with_mutable: bool) -> Self {
        Self {
            mutable: RwLock::new(with_mutable.then(|| Arc::new(MemoryStorage::new()))),
            immutables: Mutex::new(self.immutables.lock().clone()),
            cache: self.cache.clone(),
            backend: self.backend.clone(),
            merge_lock: Mutex::new(()),
        }
    }
}

impl<B: BackendStorage> MultiLayerStorage<B> {
    /// Drains the oldest immutable layer into the backend as one write batch
    /// (tombstones become deletes) and drops the layer. The only operation
    /// that touches durable storage; serialized against itself and against
    /// concurrent forks by the merge lock. Merging an empty layer is a
    /// no-op; a merged layer leaves the chain, so it cannot be merged twice.
    pub fn merge_and_pop_immutable_back(&self) -> Result<()> {
        let _merge_guard = self.merge_lock.lock();
        let layer = {
            let mut immutables = self.immutables.lock();
            immutables
                .pop_back()
                .ok_or(StorageError::NoImmutableLayer)?
        };

        let mut batch = WriteBatch::new();
        for (key, entry) in layer.drain() {
            if entry.is_deleted() {
                batch.delete(key);
            } else {
                batch.put(key, entry);
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        debug!(ops = batch.len(), "merging oldest immutable layer into backend");
        self.backend.write_batch(batch)
    }
}

impl<B: StateStorage> StateStorage for MultiLayerStorage<B> {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        if let Some(mutable) = self.mutable.read().as_ref() {
            if let Some(entry) = mutable.read(key)? {
                return Ok(Self::resolve(entry));
            }
        }
        for layer in self.immutable_snapshot() {
            if let Some(entry) = layer.read(key)? {
                return Ok(Self::resolve(entry));
            }
        }
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.read(key)? {
                return Ok(Self::resolve(entry));
            }
        }
        match self.backend.read(key)? {
            Some(entry) => {
                if let Some(cache) = &self.cache {
                    cache.write(key.clone(), entry.clone())?;
                }
                Ok(Self::resolve(entry))
            },
            None => Ok(None),
        }
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        let mutable = self
            .mutable
            .read()
            .clone()
            .ok_or(StorageError::NoMutableLayer)?;
        mutable.write(key, entry)
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        let mutable = self
            .mutable
            .read()
            .clone()
            .ok_or(StorageError::NoMutableLayer)?;
        mutable.write(key.clone(), Entry::deleted())
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        let mut merged: BTreeMap<StateKey, Entry> = BTreeMap::new();
        for (key, entry) in self.backend.scan_prefix(prefix)? {
            merged.insert(key, entry);
        }
        // Oldest immutable layer first, so younger layers shadow.
        for layer in self.immutable_snapshot().into_iter().rev() {
            for (key, entry) in layer.scan_prefix(prefix)? {
                merged.insert(key, entry);
            }
        }
        if let Some(mutable) = self.mutable.read().as_ref() {
            for (key, entry) in mutable.scan_prefix(prefix)? {
                merged.insert(key, entry);
            }
        }
        Ok(merged
            .into_iter()
            .filter(|(_, entry)| !entry.is_deleted())
            .collect())
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{Result, StateStorage};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::BTreeMap;

const DEFAULT_BUCKETS: usize = 16;

/// In-memory ordered map sharded by key hash. Point operations lock a single
/// bucket, so disjoint keys proceed concurrently; ordered scans merge the
/// buckets' sorted ranges.
///
/// Tombstones ([`Entry::deleted`]) are stored like any other entry — whether
/// a deletion shadows older layers is the layered storage's concern, not this
/// map's.
#[derive(Debug)]
pub struct MemoryStorage {
    buckets: Box<[RwLock<BTreeMap<StateKey, Entry>>]>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Self {
        assert!(buckets > 0, "MemoryStorage needs at least one bucket");
        Self {
            buckets: (0..buckets)
                .map(|_| RwLock::new(BTreeMap::new()))
                .collect(),
        }
    }

    fn bucket(&self, key: &StateKey) -> &RwLock<BTreeMap<StateKey, Entry>> {
        &self.buckets[key.hash32() as usize % self.buckets.len()]
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.read().is_empty())
    }

    /// Moves every entry out, sorted by key. The map is empty afterwards.
    pub fn drain(&self) -> Vec<(StateKey, Entry)> {
        self.buckets
            .iter()
            .map(|bucket| std::mem::take(&mut *bucket.write()))
            .kmerge_by(|a, b| a.0 < b.0)
            .collect()
    }

    /// Bulk-moves `other`'s entries into this map; entries of `other` win on
    /// key collisions (it is the younger layer). `other` is left empty.
    pub fn merge_from(&self, other: &MemoryStorage) {
        for (key, entry) in other.drain() {
            let mut bucket = self.bucket(&key).write();
            bucket.insert(key, entry);
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        Ok(self.bucket(key).read().get(key).cloned())
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        self.bucket(&key).write().insert(key, entry);
        Ok(())
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        self.bucket(key).write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        Ok(self
            .buckets
            .iter()
            .map(|bucket| {
                bucket
                    .read()
                    .iter()
                    .filter(|(key, _)| prefix.matches(key))
                    .map(|(key, entry)| (key.clone(), entry.clone()))
                    .collect::<Vec<_>>()
            })
            .kmerge_by(|a, b| a.0 < b.0)
            .collect())
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{Result, StateStorage};
use basalt_types::{Entry, StateKey, StateKeyPrefix};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

const DEFAULT_BUCKETS: usize = 16;

#[derive(Default)]
struct Bucket {
    entries: HashMap<StateKey, (Entry, u64)>,
    recency: BTreeMap<u64, StateKey>,
    bytes: usize,
    clock: u64,
}

impl Bucket {
    fn touch(&mut self, key: &StateKey) {
        let Some((_, tick)) = self.entries.get_mut(key) else {
            return;
        };
        let old_tick = *tick;
        self.clock += 1;
        *tick = self.clock;
        self.recency.remove(&old_tick);
        self.recency.insert(self.clock, key.clone());
    }

    fn erase(&mut self, key: &StateKey) {
        if let Some((entry, tick)) = self.entries.remove(key) {
            self.recency.remove(&tick);
            self.bytes -= weight(key, &entry);
        }
    }

    fn evict_to(&mut self, budget: usize) {
        while self.bytes > budget {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            if let Some((entry, _)) = self.entries.remove(&oldest) {
                self.bytes -= weight(&oldest, &entry);
            }
        }
    }
}

fn weight(key: &StateKey, entry: &Entry) -> usize {
    key.table().len() + key.key().len() + entry.size()
}

/// Bounded most-recently-used cache layer. Reads refresh recency; inserting
/// past the byte budget evicts least-recently-used entries. Never holds
/// authoritative state — anything here can be dropped and re-read from the
/// backend.
pub struct CacheStorage {
    buckets: Box<[Mutex<Bucket>]>,
    bucket_budget: usize,
}

impl CacheStorage {
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self::with_buckets(DEFAULT_BUCKETS, max_bytes)
    }

    pub fn with_buckets(buckets: usize, max_bytes: usize) -> Self {
        assert!(buckets > 0, "CacheStorage needs at least one bucket");
        Self {
            buckets: (0..buckets).map(|_| Mutex::new(Bucket::default())).collect(),
            bucket_budget: max_bytes / buckets,
        }
    }

    fn bucket(&self, key: &StateKey) -> &Mutex<Bucket> {
        &self.buckets[key.hash32() as usize % self.buckets.len()]
    }

    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.lock().entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStorage for CacheStorage {
    fn read(&self, key: &StateKey) -> Result<Option<Entry>> {
        let mut bucket = self.bucket(key).lock();
        bucket.touch(key);
        Ok(bucket.entries.get(key).map(|(entry, _)| entry.clone()))
    }

    fn write(&self, key: StateKey, entry: Entry) -> Result<()> {
        let mut bucket = self.bucket(&key).lock();
        bucket.erase(&key);
        bucket.clock += 1;
        let tick = bucket.clock;
        bucket.bytes += weight(&key, &entry);
        bucket.recency.insert(tick, key.clone());
        bucket.entries.insert(key, (entry, tick));
        bucket.evict_to(self.bucket_budget);
        Ok(())
    }

    fn remove(&self, key: &StateKey) -> Result<()> {
        self.bucket(key).lock().erase(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &StateKeyPrefix) -> Result<Vec<(StateKey, Entry)>> {
        let mut matching: Vec<_> = self
            .buckets
            .iter()
            .flat_map(|bucket| {
                bucket
                    .lock()
                    .entries
                    .iter()
                    .filter(|(key, _)| prefix.matches(key))
                    .map(|(key, (entry, _))| (key.clone(), entry.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matching)
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Bytes a table name or key keeps inline before spilling to the heap.
const INLINE_KEY_BYTES: usize = 32;

type KeyBytes = SmallVec<[u8; INLINE_KEY_BYTES]>;

/// Addresses a single entry of world-state: a table identifier plus a byte
/// string key within that table.
///
/// Keys are immutable once constructed and totally ordered lexicographically
/// by `(table, key)` — the derived ordering over the field order below.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct StateKey {
    table: KeyBytes,
    key: KeyBytes,
}

impl StateKey {
    pub fn new(table: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Self {
        Self {
            table: KeyBytes::from_slice(table.as_ref()),
            key: KeyBytes::from_slice(key.as_ref()),
        }
    }

    pub fn table(&self) -> &[u8] {
        &self.table
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Stable 32-bit hash of the full `(table, key)` pair. Feeds the conflict
    /// detector's bitmaps and storage bucket selection, so it must not vary
    /// across processes or library versions.
    pub fn hash32(&self) -> u32 {
        fxhash::hash32(self)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            String::from_utf8_lossy(&self.table),
            hex::encode(&self.key)
        )
    }
}

/// Key range selector for prefix scans: all keys of `table` whose byte string
/// starts with `key_prefix`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StateKeyPrefix {
    table: KeyBytes,
    key_prefix: KeyBytes,
}

impl StateKeyPrefix {
    pub fn new(table: impl AsRef<[u8]>, key_prefix: impl AsRef<[u8]>) -> Self {
        Self {
            table: KeyBytes::from_slice(table.as_ref()),
            key_prefix: KeyBytes::from_slice(key_prefix.as_ref()),
        }
    }

    /// Every key of `table`.
    pub fn table(table: impl AsRef<[u8]>) -> Self {
        Self::new(table, [])
    }

    pub fn matches(&self, key: &StateKey) -> bool {
        key.table() == &self.table[..] && key.key().starts_with(&self.key_prefix)
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::state_key::StateKey;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tiny_keccak::{Hasher, Keccak};

/// Payloads up to this size are stored inline in the entry itself; larger
/// ones go to a shared heap buffer.
pub const INLINE_VALUE_BYTES: usize = 32;

/// Hashed in place of the payload for deleted entries, so a deletion is
/// distinguishable from both an empty value and an absent key.
const DELETED_SENTINEL: &[u8; 8] = b"\xffDELETED";

/// Lifecycle status of a state entry. Numeric values are part of the hashing
/// scheme and must not be reordered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryStatus {
    /// Read from a lower layer or the backend, unmodified.
    Clean = 0,
    /// Tombstone: the key is removed, shadowing any older value.
    Deleted = 1,
    #[default]
    Empty = 2,
    /// Written during execution and not yet merged down.
    Modified = 3,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
enum EntryValue {
    Inline(SmallVec<[u8; INLINE_VALUE_BYTES]>),
    Shared(Bytes),
}

impl EntryValue {
    fn from_slice(bytes: &[u8]) -> Self {
        if bytes.len() <= INLINE_VALUE_BYTES {
            EntryValue::Inline(SmallVec::from_slice(bytes))
        } else {
            EntryValue::Shared(Bytes::copy_from_slice(bytes))
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            EntryValue::Inline(inline) => inline,
            EntryValue::Shared(shared) => shared,
        }
    }
}

/// A tagged state value. The payload of short entries lives inline (the
/// common case for balances, nonces and config values); long payloads share
/// a reference-counted buffer so clones stay cheap.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Entry {
    status: EntryStatus,
    value: EntryValue,
}

impl Entry {
    pub fn new(status: EntryStatus, value: impl AsRef<[u8]>) -> Self {
        Self {
            status,
            value: EntryValue::from_slice(value.as_ref()),
        }
    }

    pub fn clean(value: impl AsRef<[u8]>) -> Self {
        Self::new(EntryStatus::Clean, value)
    }

    pub fn modified(value: impl AsRef<[u8]>) -> Self {
        Self::new(EntryStatus::Modified, value)
    }

    /// Tombstone marking the key as removed.
    pub fn deleted() -> Self {
        Self::new(EntryStatus::Deleted, [])
    }

    pub fn empty() -> Self {
        Self::new(EntryStatus::Empty, [])
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_slice()
    }

    pub fn into_bytes(self) -> Bytes {
        match self.value {
            EntryValue::Inline(inline) => Bytes::copy_from_slice(&inline),
            EntryValue::Shared(shared) => shared,
        }
    }

    pub fn set_value(&mut self, value: impl AsRef<[u8]>) {
        self.value = EntryValue::from_slice(value.as_ref());
        self.status = EntryStatus::Modified;
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
    }

    pub fn is_deleted(&self) -> bool {
        self.status == EntryStatus::Deleted
    }

    pub fn size(&self) -> usize {
        self.value.as_slice().len()
    }

    /// Contribution of this entry to the block hash: keccak-256 over
    /// table ‖ key ‖ status ‖ payload. Deleted entries hash a fixed sentinel
    /// in place of the payload, so removal is never confused with absence.
    pub fn hash_with(&self, key: &StateKey) -> [u8; 32] {
        let mut hasher = Keccak::v256();
        hasher.update(key.table());
        hasher.update(key.key());
        hasher.update(&[self.status as u8]);
        match self.status {
            EntryStatus::Deleted => hasher.update(DELETED_SENTINEL),
            _ => hasher.update(self.value()),
        }
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        output
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::empty()
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Header of the block being executed. The execution core only needs the
/// coordinates that feed receipts and address derivation; the rest of the
/// consensus header stays with its owner.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    number: u64,
    timestamp: u64,
    version: u32,
}

impl BlockHeader {
    pub fn new(number: u64, timestamp: u64, version: u32) -> Self {
        Self {
            number,
            timestamp,
            version,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use basalt_state_storage::{StateStorage, StorageError};
use basalt_types::{Address, BlockHeader, LogEntry, ADDRESS_LENGTH};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallKind {
    Call,
    Create,
    Create2,
}

/// The call context handed to the VM adapter: everything it needs besides
/// the storage view.
#[derive(Clone, Debug)]
pub struct CallMessage {
    pub kind: CallKind,
    pub sender: Address,
    pub recipient: Address,
    /// Account whose code runs; for creates, the derived new address.
    pub code_address: Address,
    pub input: Bytes,
    pub gas: u64,
}

/// What the VM hands back after the single Running-stage invocation.
#[derive(Clone, Debug, Default)]
pub struct VmOutcome {
    /// EVMC-convention status code; zero is success.
    pub status_code: i32,
    pub gas_left: u64,
    pub output: Bytes,
    pub create_address: Option<Address>,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Error)]
pub enum VmError {
    /// Storage-layer failure surfaced through the VM's storage callbacks.
    /// Propagates and aborts the block.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Fault inside the VM itself. Converted to an internal-error receipt,
    /// never raised past the executor.
    #[error("vm internal error: {0}")]
    Internal(String),
}

/// The opaque bytecode executor. Called exactly once per transaction per
/// Running stage; every storage access goes through the tracked, rollbackable
/// view it is handed.
pub trait VirtualMachine: Sync {
    fn execute<S: StateStorage>(
        &self,
        storage: &S,
        message: &CallMessage,
        block: &BlockHeader,
    ) -> Result<VmOutcome, VmError>;
}

impl<V: VirtualMachine + Send + ?Sized> VirtualMachine for Arc<V> {
    fn execute<S: StateStorage>(
        &self,
        storage: &S,
        message: &CallMessage,
        block: &BlockHeader,
    ) -> Result<VmOutcome, VmError> {
        (**self).execute(storage, message, block)
    }
}

fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

fn truncate_to_address(hash: [u8; 32]) -> Address {
    let mut address = [0u8; ADDRESS_LENGTH];
    address.copy_from_slice(&hash[..ADDRESS_LENGTH]);
    Address::new(address)
}

/// New-contract address for a plain create: keccak-256 over the
/// `{block}_{context}_{seq}` coordinate string, truncated to address width.
/// Fully determined by its inputs — re-deriving with the same coordinates
/// yields the same address on every node.
pub fn derive_create_address(block_number: u64, context_id: u64, seq: u64) -> Address {
    let preimage = format!("{}_{}_{}", block_number, context_id, seq);
    truncate_to_address(keccak256(&[preimage.as_bytes()]))
}

/// CREATE2-style address: keccak-256 over 0xff ‖ sender ‖ salt ‖
/// keccak-256(init_code), truncated to address width.
pub fn derive_create2_address(sender: Address, salt: &[u8; 32], init_code: &[u8]) -> Address {
    let code_hash = keccak256(&[init_code]);
    truncate_to_address(keccak256(&[&[0xff], sender.as_bytes(), salt, &code_hash]))
}

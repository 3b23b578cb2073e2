// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Mock VM and block-running harness shared by the unit and property tests.
//! The VM interprets a bcs-encoded op list carried in the transaction
//! payload; `Copy` makes written values depend on read values, so any
//! mis-scheduled read changes the observable final state.

use crate::{
    multi_layer_storage::MultiLayerStorage, scheduler_parallel::ParallelScheduler,
    scheduler_serial::SerialScheduler,
};
use basalt_state_storage::{InMemoryBackend, StateStorage};
use basalt_transaction_executor::{
    CallKind, CallMessage, TransactionExecutor, VirtualMachine, VmError, VmOutcome,
};
use basalt_types::{
    receipt::status, Address, BlockHeader, Entry, LedgerConfig, LedgerReceiptFactory, Receipt,
    StateKey, StateKeyPrefix, Transaction,
};
use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

pub(crate) const STATE_TABLE: &str = "state";
pub(crate) const GAS_PER_OP: u64 = 100;

/// One shared pool for every test; building one per case is pure overhead.
pub(crate) static TEST_POOL: Lazy<Arc<ThreadPool>> = Lazy::new(|| {
    Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap(),
    )
});

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum MockOp {
    Read(Vec<u8>),
    Write(Vec<u8>, Vec<u8>),
    /// Read `from`, write `read value ++ b"+"` to `to`.
    Copy(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
    Revert,
    Fault,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct MockProgram {
    pub id: u64,
    pub ops: Vec<MockOp>,
}

pub(crate) fn state_key(key: &[u8]) -> StateKey {
    StateKey::new(STATE_TABLE, key)
}

/// Interprets [`MockProgram`]s and counts executions per program id, so
/// tests can observe which transactions were speculatively retried.
#[derive(Default)]
pub(crate) struct MockVm {
    execution_counts: Mutex<HashMap<u64, u64>>,
}

impl MockVm {
    pub fn execution_counts(&self) -> HashMap<u64, u64> {
        self.execution_counts.lock().clone()
    }
}

impl VirtualMachine for MockVm {
    fn execute<S: StateStorage>(
        &self,
        storage: &S,
        message: &CallMessage,
        _block: &BlockHeader,
    ) -> Result<VmOutcome, VmError> {
        let Ok(program) = bcs::from_bytes::<MockProgram>(&message.input) else {
            // Malformed input is a revert receipt, not a scheduler error.
            return Ok(VmOutcome {
                status_code: status::REVERTED,
                gas_left: 0,
                ..Default::default()
            });
        };
        *self
            .execution_counts
            .lock()
            .entry(program.id)
            .or_insert(0) += 1;

        let cost = GAS_PER_OP * program.ops.len() as u64;
        if cost > message.gas {
            return Ok(VmOutcome {
                status_code: status::OUT_OF_GAS,
                gas_left: 0,
                ..Default::default()
            });
        }

        for op in &program.ops {
            match op {
                MockOp::Read(key) => {
                    storage.read(&state_key(key))?;
                },
                MockOp::Write(key, value) => {
                    storage.write(state_key(key), Entry::modified(value))?;
                },
                MockOp::Copy(from, to) => {
                    let mut derived = storage
                        .read(&state_key(from))?
                        .map(|entry| entry.value().to_vec())
                        .unwrap_or_default();
                    derived.push(b'+');
                    storage.write(state_key(to), Entry::modified(derived))?;
                },
                MockOp::Remove(key) => {
                    storage.remove(&state_key(key))?;
                },
                MockOp::Revert => {
                    return Ok(VmOutcome {
                        status_code: status::REVERTED,
                        gas_left: message.gas - cost,
                        ..Default::default()
                    });
                },
                MockOp::Fault => return Err(VmError::Internal("mock fault".into())),
            }
        }

        Ok(VmOutcome {
            status_code: status::SUCCESS,
            gas_left: message.gas - cost,
            output: Bytes::new(),
            create_address: (message.kind == CallKind::Create).then_some(message.code_address),
            logs: Vec::new(),
        })
    }
}

pub(crate) fn mock_transaction(index: usize, ops: Vec<MockOp>) -> Transaction {
    let program = MockProgram {
        id: index as u64,
        ops,
    };
    Transaction::new(
        Address::new([0x11; 20]),
        Some(Address::new([0x22; 20])),
        Bytes::from(bcs::to_bytes(&program).unwrap()),
        1_000_000,
    )
}

pub(crate) fn create_transaction(index: usize) -> Transaction {
    let program = MockProgram {
        id: index as u64,
        ops: Vec::new(),
    };
    Transaction::new(
        Address::new([0x11; 20]),
        None,
        Bytes::from(bcs::to_bytes(&program).unwrap()),
        1_000_000,
    )
}

pub(crate) fn block_header() -> BlockHeader {
    BlockHeader::new(1, 1_000, 1)
}

pub(crate) fn seeded_storage(
    seed: &[(Vec<u8>, Vec<u8>)],
) -> MultiLayerStorage<Arc<InMemoryBackend>> {
    let backend = Arc::new(InMemoryBackend::new());
    for (key, value) in seed {
        backend.write(state_key(key), Entry::clean(value)).unwrap();
    }
    let storage = MultiLayerStorage::new(backend);
    storage.new_mutable().unwrap();
    storage
}

/// Final state as seen through the view: every live `(key, value)` of the
/// state table, sorted.
pub(crate) fn snapshot<S: StateStorage>(storage: &S) -> Vec<(StateKey, Vec<u8>)> {
    storage
        .scan_prefix(&StateKeyPrefix::table(STATE_TABLE))
        .unwrap()
        .into_iter()
        .map(|(key, entry)| (key, entry.value().to_vec()))
        .collect()
}

pub(crate) fn run_serial(
    transactions: &[Transaction],
    seed: &[(Vec<u8>, Vec<u8>)],
) -> (Vec<Receipt>, Vec<(StateKey, Vec<u8>)>) {
    let storage = seeded_storage(seed);
    let executor = TransactionExecutor::new(MockVm::default(), LedgerReceiptFactory);
    let receipts = SerialScheduler::new()
        .execute_block(
            &storage,
            &executor,
            &block_header(),
            transactions,
            &LedgerConfig::default(),
        )
        .unwrap();
    (receipts, snapshot(&storage))
}

pub(crate) fn run_parallel(
    transactions: &[Transaction],
    seed: &[(Vec<u8>, Vec<u8>)],
    grain_size: usize,
) -> (Vec<Receipt>, Vec<(StateKey, Vec<u8>)>, HashMap<u64, u64>) {
    let storage = seeded_storage(seed);
    let vm = Arc::new(MockVm::default());
    let executor = TransactionExecutor::new(Arc::clone(&vm), LedgerReceiptFactory);
    let scheduler = ParallelScheduler::new(Arc::clone(&TEST_POOL), grain_size);
    let receipts = scheduler
        .execute_block(
            &storage,
            &executor,
            &block_header(),
            transactions,
            &LedgerConfig::default(),
        )
        .unwrap();
    (receipts, snapshot(&storage), vm.execution_counts())
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::SchedulerError,
    multi_layer_storage::MultiLayerStorage,
    proptest_types::types::{
        block_header, create_transaction, mock_transaction, run_parallel, run_serial, snapshot,
        state_key, MockOp, MockVm, TEST_POOL,
    },
    scheduler_parallel::ParallelScheduler,
    scheduler_serial::SerialScheduler,
};
use basalt_state_storage::{InMemoryBackend, StateStorage, StorageError};
use basalt_transaction_executor::{derive_create_address, TransactionExecutor};
use basalt_types::{receipt::status, ConfigError, Features, LedgerConfig, LedgerReceiptFactory};
use claims::assert_ok;
use std::sync::Arc;

/// 100 transactions, grain size 10; transaction 45 writes K and transaction
/// 52 reads it. The chunk holding transaction 52 must be detected as
/// conflicting, discarded, and re-executed after chunk [40, 50) commits —
/// and the retried read must observe transaction 45's write.
#[test]
fn conflict_at_chunk_boundary_retries_the_suffix() {
    let mut programs: Vec<Vec<MockOp>> = (0..100)
        .map(|i| {
            vec![MockOp::Write(
                format!("own{}", i).into_bytes(),
                vec![i as u8],
            )]
        })
        .collect();
    programs[45] = vec![MockOp::Write(b"K".to_vec(), b"forty-five".to_vec())];
    programs[52] = vec![MockOp::Copy(b"K".to_vec(), b"k52".to_vec())];
    let transactions: Vec<_> = programs
        .into_iter()
        .enumerate()
        .map(|(i, ops)| mock_transaction(i, ops))
        .collect();

    let (receipts, state, counts) = run_parallel(&transactions, &[], 10);
    assert!(receipts.iter().all(|r| r.is_success()));

    // Transactions before the conflicting chunk committed in the first pass.
    for i in 0..50u64 {
        assert_eq!(counts[&i], 1, "transaction {} retried unexpectedly", i);
    }
    // The chunk [50, 60) was speculatively executed, discarded and retried.
    for i in 50..60u64 {
        assert_eq!(counts[&i], 2, "transaction {} not retried", i);
    }
    // Later chunks may or may not have started before the abort flag rose.
    for i in 60..100u64 {
        assert!(
            (1..=2).contains(&counts[&i]),
            "transaction {} ran {} times",
            i,
            counts[&i]
        );
    }

    // The retried read saw transaction 45's write: Copy appends one '+'.
    let k52 = state
        .iter()
        .find(|(key, _)| key == &state_key(b"k52"))
        .map(|(_, value)| value.clone());
    assert_eq!(k52, Some(b"forty-five+".to_vec()));

    // And the whole block matches the serial reference.
    let (serial_receipts, serial_state) = run_serial(&transactions, &[]);
    assert_eq!(receipts, serial_receipts);
    assert_eq!(state, serial_state);
}

/// A dependency chain crossing every chunk boundary forces the worst case:
/// one accepted chunk per pass, ⌈N/G⌉ passes total. Still deterministic.
#[test]
fn dependency_chain_across_chunks_matches_serial() {
    fn key(i: usize) -> Vec<u8> {
        format!("chain{}", i).into_bytes()
    }

    let mut programs = vec![vec![MockOp::Write(key(0), b"seed".to_vec())]];
    for i in 1..12 {
        programs.push(vec![MockOp::Copy(key(i - 1), key(i))]);
    }
    let transactions: Vec<_> = programs
        .into_iter()
        .enumerate()
        .map(|(i, ops)| mock_transaction(i, ops))
        .collect();

    let (serial_receipts, serial_state) = run_serial(&transactions, &[]);
    let (receipts, state, _) = run_parallel(&transactions, &[], 3);
    assert_eq!(receipts, serial_receipts);
    assert_eq!(state, serial_state);

    // k11 accumulated one '+' per hop.
    let expected = [b"seed".to_vec(), vec![b'+'; 11]].concat();
    let last = state
        .iter()
        .find(|(k, _)| k == &state_key(&key(11)))
        .map(|(_, v)| v.clone());
    assert_eq!(last, Some(expected));
}

#[test]
fn revert_discards_speculative_writes() {
    let transactions = vec![
        mock_transaction(0, vec![MockOp::Write(b"a".to_vec(), b"1".to_vec())]),
        mock_transaction(
            1,
            vec![
                MockOp::Write(b"x".to_vec(), b"1".to_vec()),
                MockOp::Write(b"y".to_vec(), b"2".to_vec()),
                MockOp::Write(b"z".to_vec(), b"3".to_vec()),
                MockOp::Revert,
            ],
        ),
        mock_transaction(2, vec![MockOp::Write(b"b".to_vec(), b"2".to_vec())]),
    ];

    let (receipts, state, _) = run_parallel(&transactions, &[], 2);
    assert_eq!(receipts[1].status(), status::REVERTED);
    assert!(receipts[0].is_success() && receipts[2].is_success());

    // None of the three keys changed.
    let keys: Vec<_> = state.iter().map(|(key, _)| key.clone()).collect();
    assert_eq!(keys, vec![state_key(b"a"), state_key(b"b")]);

    let (serial_receipts, serial_state) = run_serial(&transactions, &[]);
    assert_eq!(receipts, serial_receipts);
    assert_eq!(state, serial_state);
}

#[test]
fn vm_fault_becomes_an_internal_error_receipt() {
    let transactions = vec![
        mock_transaction(0, vec![MockOp::Write(b"a".to_vec(), b"1".to_vec())]),
        mock_transaction(
            1,
            vec![MockOp::Write(b"w".to_vec(), b"1".to_vec()), MockOp::Fault],
        ),
    ];

    let (receipts, state, _) = run_parallel(&transactions, &[], 10);
    assert_eq!(receipts[1].status(), status::INTERNAL_ERROR);
    assert_eq!(receipts[1].message(), "mock fault");
    assert!(state.iter().all(|(key, _)| key != &state_key(b"w")));

    let (serial_receipts, serial_state) = run_serial(&transactions, &[]);
    assert_eq!(receipts, serial_receipts);
    assert_eq!(state, serial_state);
}

#[test]
fn malformed_input_yields_a_revert_receipt() {
    let garbage = basalt_types::Transaction::new(
        basalt_types::Address::new([0x11; 20]),
        Some(basalt_types::Address::new([0x22; 20])),
        bytes::Bytes::from_static(b"\xff\xff\xff"),
        1_000_000,
    );
    let (receipts, _, _) = run_parallel(&[garbage], &[], 10);
    assert_eq!(receipts[0].status(), status::REVERTED);
}

#[test]
fn invalid_config_is_rejected_before_any_execution() {
    let transactions = vec![mock_transaction(0, vec![MockOp::Revert])];
    let storage = crate::proptest_types::types::seeded_storage(&[]);
    let vm = Arc::new(MockVm::default());
    let executor = TransactionExecutor::new(Arc::clone(&vm), LedgerReceiptFactory);
    let scheduler = ParallelScheduler::new(Arc::clone(&TEST_POOL), 10);

    // tx_gas_limit exceeds block_gas_limit.
    let config = LedgerConfig::new(10, 100, Features::default());
    let result = scheduler.execute_block(
        &storage,
        &executor,
        &block_header(),
        &transactions,
        &config,
    );
    assert!(matches!(result, Err(SchedulerError::Config(_))));
    assert!(vm.execution_counts().is_empty());
}

#[test]
fn unknown_feature_flag_is_a_config_error() {
    let err = Features::from_names(&["feature_warp_drive"]).unwrap_err();
    assert_eq!(
        SchedulerError::from(err),
        SchedulerError::Config(ConfigError::UnknownFeature("feature_warp_drive".into()))
    );
}

#[test]
fn empty_block_produces_no_receipts() {
    let (receipts, state, counts) = run_parallel(&[], &[], 10);
    assert!(receipts.is_empty());
    assert!(state.is_empty());
    assert!(counts.is_empty());
}

/// Create transactions derive their address from (block number, context id,
/// sequence) only — identical under both schedulers and across re-runs.
#[test]
fn create_addresses_are_deterministic() {
    let transactions = vec![create_transaction(0), create_transaction(1)];

    let (serial_receipts, _) = run_serial(&transactions, &[]);
    let (receipts, _, _) = run_parallel(&transactions, &[], 1);

    assert_eq!(receipts, serial_receipts);
    assert_eq!(
        receipts[0].contract_address(),
        Some(derive_create_address(block_header().number(), 0, 0))
    );
    assert_eq!(
        receipts[1].contract_address(),
        Some(derive_create_address(block_header().number(), 1, 0))
    );
}

/// Without a mutable layer on the pass storage the block fails atomically:
/// the error propagates and no state reaches the backend.
#[test]
fn missing_mutable_layer_aborts_the_block() {
    let backend = Arc::new(InMemoryBackend::new());
    let storage = MultiLayerStorage::new(Arc::clone(&backend));
    let executor = TransactionExecutor::new(MockVm::default(), LedgerReceiptFactory);
    let transactions = vec![mock_transaction(
        0,
        vec![MockOp::Write(b"a".to_vec(), b"1".to_vec())],
    )];

    let result = ParallelScheduler::new(Arc::clone(&TEST_POOL), 10).execute_block(
        &storage,
        &executor,
        &block_header(),
        &transactions,
        &LedgerConfig::default(),
    );
    assert_eq!(
        result,
        Err(SchedulerError::Storage(StorageError::NoMutableLayer))
    );
    assert!(snapshot(&backend).is_empty());

    let serial_result = SerialScheduler::new().execute_block(
        &storage,
        &executor,
        &block_header(),
        &transactions,
        &LedgerConfig::default(),
    );
    assert_eq!(
        serial_result,
        Err(SchedulerError::Storage(StorageError::NoMutableLayer))
    );
}

/// End-of-block lifecycle: promote the pass layer, merge it down, and read
/// the result straight from the backend in the next block's fork.
#[test]
fn promote_and_merge_round_trip() {
    let transactions = vec![mock_transaction(
        0,
        vec![MockOp::Write(b"persist".to_vec(), b"durable".to_vec())],
    )];
    let storage = crate::proptest_types::types::seeded_storage(&[]);
    let executor = TransactionExecutor::new(MockVm::default(), LedgerReceiptFactory);
    let receipts = assert_ok!(ParallelScheduler::new(Arc::clone(&TEST_POOL), 4).execute_block(
        &storage,
        &executor,
        &block_header(),
        &transactions,
        &LedgerConfig::default(),
    ));
    assert!(receipts[0].is_success());

    assert_ok!(storage.push_mutable_to_front());
    assert_ok!(storage.merge_and_pop_immutable_back());

    let value = assert_ok!(storage.backend().read(&state_key(b"persist")));
    assert_eq!(value.map(|e| e.value().to_vec()), Some(b"durable".to_vec()));
}

/// Spot-check of the §8 grid on a fixed conflict-heavy block, cheaper than
/// the full proptest and handy when debugging.
#[test]
fn grain_size_grid_on_a_fixed_block() {
    let transactions: Vec<_> = (0..23)
        .map(|i| {
            mock_transaction(
                i,
                vec![
                    MockOp::Copy(b"hot".to_vec(), format!("out{}", i).into_bytes()),
                    MockOp::Write(b"hot".to_vec(), vec![i as u8]),
                ],
            )
        })
        .collect();
    let seed = vec![(b"hot".to_vec(), b"seed".to_vec())];

    let (serial_receipts, serial_state) = run_serial(&transactions, &seed);
    let n = transactions.len();
    for grain_size in [1, 2, 7, n, n + 100] {
        let (receipts, state, _) = run_parallel(&transactions, &seed, grain_size);
        assert_eq!(receipts, serial_receipts, "grain size {}", grain_size);
        assert_eq!(state, serial_state, "grain size {}", grain_size);
    }
}

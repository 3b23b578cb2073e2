// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    counters,
    error::SchedulerError,
    multi_layer_storage::MultiLayerStorage,
    read_write_set_storage::ReadWriteSetStorage,
};
use basalt_state_storage::{MemoryStorage, StateStorage, StorageError};
use basalt_transaction_executor::{
    ExecutedTransaction, PreparedTransaction, TransactionExecutor, VirtualMachine,
};
use basalt_types::{BlockHeader, LedgerConfig, Receipt, ReceiptFactory, Transaction};
use crossbeam::{channel, utils::CachePadded};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::{
    collections::BTreeMap,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, info};

/// Default chunk length for speculative execution.
pub const DEFAULT_GRAIN_SIZE: usize = 32;

enum ContextStage {
    Pending,
    Prepared(PreparedTransaction),
    Executed(ExecutedTransaction),
    Done,
}

/// Per-transaction scheduling state: the absolute transaction index, the
/// stage handle, and the write-once receipt slot. Lives for one scheduling
/// pass — retried transactions get fresh contexts.
struct ExecutionContext {
    index: usize,
    stage: ContextStage,
    receipt: Option<Receipt>,
}

type ChunkView<'a, B> = MultiLayerStorage<&'a MultiLayerStorage<B>>;

/// One contiguous chunk of the pass: a private fork of the pass storage (the
/// pass view becomes the chunk view's backend), the read/write-set tracker
/// around it, and a context per transaction.
struct ChunkStatus<'a, B: StateStorage> {
    index: usize,
    transactions: &'a [Transaction],
    tracker: ReadWriteSetStorage<ChunkView<'a, B>>,
    contexts: Vec<ExecutionContext>,
    error: Option<StorageError>,
}

impl<'a, B: StateStorage> ChunkStatus<'a, B> {
    fn new(
        index: usize,
        start: usize,
        transactions: &'a [Transaction],
        pass_storage: &'a MultiLayerStorage<B>,
    ) -> Result<Self, StorageError> {
        let view = MultiLayerStorage::new(pass_storage);
        view.new_mutable()?;
        Ok(Self {
            index,
            transactions,
            tracker: ReadWriteSetStorage::new(view),
            contexts: (0..transactions.len())
                .map(|offset| ExecutionContext {
                    index: start + offset,
                    stage: ContextStage::Pending,
                    receipt: None,
                })
                .collect(),
            error: None,
        })
    }

    fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Stage 1: build call contexts, in parallel across the chunk's
    /// transactions. No storage is touched, so nothing can conflict here.
    fn execute_prepare<V: VirtualMachine, R: ReceiptFactory>(
        &mut self,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
        ledger_config: &LedgerConfig,
        has_raw: &AtomicBool,
    ) {
        let transactions = self.transactions;
        self.contexts
            .par_iter_mut()
            .zip(transactions.par_iter())
            .for_each(|(context, transaction)| {
                if has_raw.load(Ordering::Relaxed) {
                    return;
                }
                context.stage = ContextStage::Prepared(executor.prepare(
                    block,
                    ledger_config,
                    transaction,
                    context.index as u64,
                ));
            });
    }

    /// Stage 2: the VM runs, serially in transaction order within the chunk,
    /// against the chunk's tracked private view. A storage error poisons the
    /// chunk and, once it reaches the validator, the whole block.
    fn execute_run<V: VirtualMachine, R: ReceiptFactory>(
        &mut self,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
        has_raw: &AtomicBool,
    ) {
        for context in &mut self.contexts {
            if has_raw.load(Ordering::Relaxed) || self.error.is_some() {
                return;
            }
            if let ContextStage::Prepared(prepared) =
                mem::replace(&mut context.stage, ContextStage::Done)
            {
                match executor.execute(&self.tracker, block, prepared) {
                    Ok(executed) => context.stage = ContextStage::Executed(executed),
                    Err(err) => self.error = Some(err),
                }
            }
        }
    }

    /// Stage 3: build receipts, in parallel across the chunk's transactions.
    /// Only accepted (fully executed, validated) chunks get here.
    fn execute_finalize<V: VirtualMachine, R: ReceiptFactory>(
        &mut self,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
    ) {
        let block_number = block.number();
        self.contexts.par_iter_mut().for_each(|context| {
            if let ContextStage::Executed(executed) =
                mem::replace(&mut context.stage, ContextStage::Done)
            {
                context.receipt = Some(executor.finalize(executed, block_number));
            }
        });
    }

    /// Moves this chunk's receipts into the block-wide slots. Each slot is
    /// written exactly once per block.
    fn collect_receipts(&mut self, receipts: &mut [Option<Receipt>]) -> Result<(), SchedulerError> {
        for context in &mut self.contexts {
            let receipt = context.receipt.take().ok_or_else(|| {
                SchedulerError::Fatal(format!(
                    "no receipt produced for accepted transaction {}",
                    context.index
                ))
            })?;
            if receipts[context.index].is_some() {
                return Err(SchedulerError::Fatal(format!(
                    "receipt slot {} filled twice",
                    context.index
                )));
            }
            receipts[context.index] = Some(receipt);
        }
        Ok(())
    }

    fn take_mutable(&self) -> Result<Arc<MemoryStorage>, StorageError> {
        self.tracker.storage().take_mutable()
    }
}

/// The speculative/optimistic engine: chunks of the block execute in
/// parallel against private storage forks, a strictly-ordered validator
/// intersects each chunk's read set with everything committed before it, and
/// the suffix behind the first conflict is re-executed from scratch in the
/// next pass.
///
/// The receipt sequence and final storage state are bit-identical to
/// [`crate::SerialScheduler`] for every grain size and thread count; merges
/// happen in chunk-index order, which is what makes the directional
/// read-after-write check sufficient.
pub struct ParallelScheduler {
    thread_pool: Arc<ThreadPool>,
    grain_size: usize,
}

impl ParallelScheduler {
    /// The pool needs at least two threads: one drives the in-order
    /// validator while the rest execute chunks. Single-threaded callers
    /// should use [`crate::SerialScheduler`].
    pub fn new(thread_pool: Arc<ThreadPool>, grain_size: usize) -> Self {
        assert!(grain_size > 0, "transaction grain size must be positive");
        assert!(
            thread_pool.current_num_threads() > 1,
            "parallel scheduler needs at least two worker threads"
        );
        Self {
            thread_pool,
            grain_size,
        }
    }

    pub fn with_default_pool(grain_size: usize) -> Self {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get().max(2))
            .thread_name(|index| format!("basalt-exec-{}", index))
            .build()
            .expect("failed to build scheduler thread pool");
        Self::new(Arc::new(thread_pool), grain_size)
    }

    pub fn execute_block<B, V, R>(
        &self,
        storage: &MultiLayerStorage<B>,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
        transactions: &[Transaction],
        ledger_config: &LedgerConfig,
    ) -> Result<Vec<Receipt>, SchedulerError>
    where
        B: StateStorage,
        V: VirtualMachine,
        R: ReceiptFactory,
    {
        ledger_config.validate()?;
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let _timer = counters::BLOCK_EXECUTE_SECONDS.start_timer();

        let mut receipts: Vec<Option<Receipt>> = Vec::new();
        receipts.resize_with(transactions.len(), || None);

        let mut offset = 0;
        let mut passes = 0;
        while offset < transactions.len() {
            let new_offset = self.execute_single_pass(
                storage,
                executor,
                block,
                transactions,
                ledger_config,
                offset,
                &mut receipts,
            )?;
            if new_offset == offset {
                return Err(SchedulerError::Fatal(
                    "scheduling pass made no progress".into(),
                ));
            }
            offset = new_offset;
            passes += 1;
            counters::SCHEDULER_PASSES.inc();
        }

        info!(
            block = block.number(),
            txns = transactions.len(),
            passes,
            "parallel execution completed"
        );

        receipts
            .into_iter()
            .enumerate()
            .map(|(index, receipt)| {
                receipt.ok_or_else(|| {
                    SchedulerError::Fatal(format!("no receipt produced for transaction {}", index))
                })
            })
            .collect()
    }

    /// One pass over `[offset..N)`: chunk, execute speculatively, validate in
    /// order, finalize and merge the accepted prefix. Returns the new offset;
    /// the caller loops until every transaction is accepted. Chunk 0 can
    /// never conflict, so each pass accepts at least one chunk.
    fn execute_single_pass<B, V, R>(
        &self,
        storage: &MultiLayerStorage<B>,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
        transactions: &[Transaction],
        ledger_config: &LedgerConfig,
        offset: usize,
        receipts: &mut Vec<Option<Receipt>>,
    ) -> Result<usize, SchedulerError>
    where
        B: StateStorage,
        V: VirtualMachine,
        R: ReceiptFactory,
    {
        debug!(
            offset,
            remaining = transactions.len() - offset,
            "starting scheduling pass"
        );
        let has_raw = CachePadded::new(AtomicBool::new(false));

        let mut chunks = Vec::new();
        let mut start = offset;
        while start < transactions.len() {
            let end = usize::min(start + self.grain_size, transactions.len());
            chunks.push(ChunkStatus::new(
                chunks.len(),
                start,
                &transactions[start..end],
                storage,
            )?);
            start = end;
        }

        // Running union of accepted chunks' write sets, maintained only by
        // the in-order validator below.
        let committed_write_set = ReadWriteSetStorage::new(storage);
        let mut accepted: Vec<ChunkStatus<'_, B>> = Vec::with_capacity(chunks.len());
        let mut discarded: Vec<ChunkStatus<'_, B>> = Vec::new();
        let mut first_error: Option<StorageError> = None;

        let (sender, receiver) = channel::unbounded();
        self.thread_pool.scope(|scope| {
            for mut chunk in chunks {
                let sender = sender.clone();
                let has_raw = &has_raw;
                scope.spawn(move |_| {
                    debug!(chunk = chunk.index, txns = chunk.len(), "executing chunk");
                    chunk.execute_prepare(executor, block, ledger_config, has_raw);
                    chunk.execute_run(executor, block, has_raw);
                    // Receiver outlives the scope; a send cannot fail.
                    let _ = sender.send(chunk);
                });
            }
            drop(sender);

            // Validation, strictly in chunk order: completion order is
            // whatever the pool made of it, the cursor restores determinism.
            let mut pending = BTreeMap::new();
            let mut next_index = 0;
            for chunk in receiver.iter() {
                pending.insert(chunk.index, chunk);
                while let Some(mut chunk) = pending.remove(&next_index) {
                    next_index += 1;
                    if first_error.is_some() || has_raw.load(Ordering::Relaxed) {
                        discarded.push(chunk);
                        continue;
                    }
                    if let Some(err) = chunk.error.take() {
                        // Poisoned chunk: abort the block, but let in-flight
                        // work drain first.
                        has_raw.store(true, Ordering::Relaxed);
                        first_error = Some(err);
                        discarded.push(chunk);
                        continue;
                    }
                    if chunk.index > 0
                        && committed_write_set.has_raw_intersection(&chunk.tracker)
                    {
                        counters::RAW_CONFLICTS.inc();
                        debug!(chunk = chunk.index, "detected read-after-write conflict");
                        has_raw.store(true, Ordering::Relaxed);
                        discarded.push(chunk);
                        continue;
                    }
                    debug!(
                        chunk = chunk.index,
                        txns = chunk.len(),
                        "merging chunk write set"
                    );
                    committed_write_set.merge_write_set(&chunk.tracker);
                    accepted.push(chunk);
                }
            }
        });

        if let Some(err) = first_error {
            return Err(err.into());
        }

        // Stage 3: receipts for the accepted prefix. A conflict detected
        // above does not cancel these — accepted chunks are valid and their
        // results are merged regardless.
        self.thread_pool.install(|| {
            accepted
                .par_iter_mut()
                .for_each(|chunk| chunk.execute_finalize(executor, block));
        });

        // Merge, strictly in chunk order: receipts into their slots, chunk
        // layers into the pass accumulator, the accumulator into the pass
        // storage's mutable layer.
        let last_storage = MemoryStorage::new();
        let mut new_offset = offset;
        for chunk in &mut accepted {
            new_offset += chunk.len();
            chunk.collect_receipts(receipts)?;
            let mutable = chunk.take_mutable()?;
            last_storage.merge_from(&mutable);
            counters::EXECUTED_CHUNKS.inc();
        }
        debug!(accepted = accepted.len(), "merging last storage");
        let pass_mutable = storage
            .mutable_storage()
            .ok_or(StorageError::NoMutableLayer)?;
        pass_mutable.merge_from(&last_storage);

        // Discarded chunks' speculative layers are dead weight; free them off
        // the critical path.
        let dead_layers: Vec<_> = discarded
            .iter()
            .filter_map(|chunk| chunk.take_mutable().ok())
            .collect();
        self.thread_pool.spawn(move || drop(dead_layers));

        Ok(new_offset)
    }
}

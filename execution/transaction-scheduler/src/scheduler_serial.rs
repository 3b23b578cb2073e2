// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{counters, error::SchedulerError};
use basalt_state_storage::StateStorage;
use basalt_transaction_executor::{TransactionExecutor, VirtualMachine};
use basalt_types::{BlockHeader, LedgerConfig, Receipt, ReceiptFactory, Transaction};
use tracing::info;

/// Baseline scheduler: all three stages of every transaction run strictly in
/// index order against one shared storage view. Produces the canonical
/// receipt sequence the parallel scheduler must reproduce exactly, and
/// serves as the fallback when speculation is disabled or pointless.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialScheduler;

impl SerialScheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn execute_block<S, V, R>(
        &self,
        storage: &S,
        executor: &TransactionExecutor<V, R>,
        block: &BlockHeader,
        transactions: &[Transaction],
        ledger_config: &LedgerConfig,
    ) -> Result<Vec<Receipt>, SchedulerError>
    where
        S: StateStorage,
        V: VirtualMachine,
        R: ReceiptFactory,
    {
        ledger_config.validate()?;
        let _timer = counters::BLOCK_EXECUTE_SECONDS.start_timer();

        let mut receipts = Vec::with_capacity(transactions.len());
        for (index, transaction) in transactions.iter().enumerate() {
            let receipt = executor.execute_transaction(
                storage,
                block,
                ledger_config,
                transaction,
                index as u64,
            )?;
            receipts.push(receipt);
        }

        info!(
            block = block.number(),
            txns = transactions.len(),
            "serial execution completed"
        );
        Ok(receipts)
    }
}

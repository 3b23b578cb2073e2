// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    rollbackable::Rollbackable,
    vm::{derive_create_address, CallKind, CallMessage, VirtualMachine, VmError, VmOutcome},
};
use basalt_state_storage::{StateStorage, StorageError};
use basalt_types::{
    receipt::status, BlockHeader, LedgerConfig, Receipt, ReceiptFactory, Transaction,
};
use bytes::Bytes;
use tracing::debug;

/// Output of the Prepared stage: the assembled call context, not yet bound to
/// any storage.
#[derive(Clone, Debug)]
pub struct PreparedTransaction {
    context_id: u64,
    message: CallMessage,
}

impl PreparedTransaction {
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn message(&self) -> &CallMessage {
        &self.message
    }
}

enum ExecutionOutcome {
    Completed(VmOutcome),
    Faulted(String),
}

/// Output of the Running stage. Failures of the transaction itself (revert,
/// out-of-gas, VM fault) are captured in here, not raised — only storage
/// errors escape the stage.
pub struct ExecutedTransaction {
    context_id: u64,
    gas_limit: u64,
    outcome: ExecutionOutcome,
}

impl ExecutedTransaction {
    pub fn context_id(&self) -> u64 {
        self.context_id
    }
}

/// Runs one transaction through its three stages against a storage view, via
/// the external VM adapter.
///
/// Stage contract: `prepare` touches no storage and may run for many
/// transactions fully in parallel; `execute` performs the single VM
/// invocation with all its storage traffic and must be serialized per view;
/// `finalize` only shapes the receipt and parallelizes freely again.
pub struct TransactionExecutor<V, R> {
    vm: V,
    receipt_factory: R,
}

impl<V: VirtualMachine, R: ReceiptFactory> TransactionExecutor<V, R> {
    pub fn new(vm: V, receipt_factory: R) -> Self {
        Self {
            vm,
            receipt_factory,
        }
    }

    /// Stage 1: build the VM call context. An absent recipient makes this a
    /// create; the new address is derived from (block number, context id,
    /// sequence) and nothing else, so every replica derives the same one.
    pub fn prepare(
        &self,
        block: &BlockHeader,
        ledger_config: &LedgerConfig,
        transaction: &Transaction,
        context_id: u64,
    ) -> PreparedTransaction {
        let gas = transaction.gas_limit().min(ledger_config.tx_gas_limit());
        let message = match transaction.to() {
            Some(recipient) => CallMessage {
                kind: CallKind::Call,
                sender: transaction.sender(),
                recipient,
                code_address: recipient,
                input: transaction.input().clone(),
                gas,
            },
            None => {
                let created = derive_create_address(block.number(), context_id, 0);
                CallMessage {
                    kind: CallKind::Create,
                    sender: transaction.sender(),
                    recipient: created,
                    code_address: created,
                    input: transaction.input().clone(),
                    gas,
                }
            },
        };
        PreparedTransaction {
            context_id,
            message,
        }
    }

    /// Stage 2: the single VM invocation. The view is wrapped in a fresh
    /// [`Rollbackable`]; on any non-success outcome the writes made since
    /// entry are unwound before returning, so a failed transaction leaves no
    /// trace in the view.
    pub fn execute<S: StateStorage>(
        &self,
        storage: &S,
        block: &BlockHeader,
        prepared: PreparedTransaction,
    ) -> Result<ExecutedTransaction, StorageError> {
        let rollbackable = Rollbackable::new(storage);
        let savepoint = rollbackable.current_savepoint();
        let gas_limit = prepared.message.gas;

        let outcome = match self.vm.execute(&rollbackable, &prepared.message, block) {
            Ok(outcome) => {
                if outcome.status_code != status::SUCCESS {
                    debug!(
                        context_id = prepared.context_id,
                        status = outcome.status_code,
                        "transaction revert"
                    );
                    rollbackable.rollback(savepoint)?;
                }
                ExecutionOutcome::Completed(outcome)
            },
            Err(VmError::Storage(err)) => return Err(err),
            Err(VmError::Internal(message)) => {
                debug!(
                    context_id = prepared.context_id,
                    error = %message,
                    "execute exception"
                );
                rollbackable.rollback(savepoint)?;
                ExecutionOutcome::Faulted(message)
            },
        };

        Ok(ExecutedTransaction {
            context_id: prepared.context_id,
            gas_limit,
            outcome,
        })
    }

    /// Stage 3: shape the receipt. Reverts are ordinary receipts with a
    /// failure status; VM faults become internal-error receipts carrying the
    /// diagnostic. Nothing thrown past this point.
    pub fn finalize(&self, executed: ExecutedTransaction, block_number: u64) -> Receipt {
        match executed.outcome {
            ExecutionOutcome::Completed(outcome) => self.receipt_factory.create_receipt(
                executed.gas_limit.saturating_sub(outcome.gas_left),
                outcome.create_address,
                outcome.logs,
                outcome.status_code,
                outcome.output,
                block_number,
            ),
            ExecutionOutcome::Faulted(message) => {
                let mut receipt = self.receipt_factory.create_receipt(
                    0,
                    None,
                    Vec::new(),
                    status::INTERNAL_ERROR,
                    Bytes::new(),
                    block_number,
                );
                receipt.set_message(message);
                receipt
            },
        }
    }

    /// All three stages back to back, for callers that do not interleave.
    pub fn execute_transaction<S: StateStorage>(
        &self,
        storage: &S,
        block: &BlockHeader,
        ledger_config: &LedgerConfig,
        transaction: &Transaction,
        context_id: u64,
    ) -> Result<Receipt, StorageError> {
        let prepared = self.prepare(block, ledger_config, transaction, context_id);
        let executed = self.execute(storage, block, prepared)?;
        Ok(self.finalize(executed, block.number()))
    }
}

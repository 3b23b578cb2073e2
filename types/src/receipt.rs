// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::transaction::Address;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Execution status codes carried by receipts. Values follow the EVMC
/// convention so they round-trip through VM adapters unchanged.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const REVERTED: i32 = 2;
    pub const OUT_OF_GAS: i32 = 3;
    pub const INTERNAL_ERROR: i32 = -1;
}

/// A log record emitted during execution.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Bytes,
}

/// The executor's verdict on one transaction. Write-once: receipts are
/// constructed complete (modulo the diagnostic message) and never amended
/// after they enter the block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    status: i32,
    gas_used: u64,
    output: Bytes,
    contract_address: Option<Address>,
    logs: Vec<LogEntry>,
    block_number: u64,
    message: String,
}

impl Receipt {
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn output(&self) -> &Bytes {
        &self.output
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.contract_address
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }
}

/// Consumed boundary: the execution core describes the outcome, the factory
/// decides the receipt representation.
pub trait ReceiptFactory: Sync {
    fn create_receipt(
        &self,
        gas_used: u64,
        contract_address: Option<Address>,
        logs: Vec<LogEntry>,
        status: i32,
        output: Bytes,
        block_number: u64,
    ) -> Receipt;
}

/// Default factory producing plain in-memory receipts.
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerReceiptFactory;

impl ReceiptFactory for LedgerReceiptFactory {
    fn create_receipt(
        &self,
        gas_used: u64,
        contract_address: Option<Address>,
        logs: Vec<LogEntry>,
        status: i32,
        output: Bytes,
        block_number: u64,
    ) -> Receipt {
        Receipt {
            status,
            gas_used,
            output,
            contract_address,
            logs,
            block_number,
            message: String::new(),
        }
    }
}

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core data model of the basalt ledger execution engine: state keys and
//! entries, transactions and receipts, block headers and the ledger
//! configuration shared by the execution stack.

pub mod block;
pub mod entry;
pub mod ledger_config;
pub mod receipt;
pub mod state_key;
pub mod transaction;

pub use block::BlockHeader;
pub use entry::{Entry, EntryStatus};
pub use ledger_config::{ConfigError, FeatureFlag, Features, LedgerConfig};
pub use receipt::{LedgerReceiptFactory, LogEntry, Receipt, ReceiptFactory};
pub use state_key::{StateKey, StateKeyPrefix};
pub use transaction::{Address, Transaction, ADDRESS_LENGTH};

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Executes one transaction at a time against a storage view, staged into
//! three yield points — prepare, run, finalize — so a scheduler can
//! interleave many transactions' stages. The virtual machine itself is an
//! external collaborator behind [`vm::VirtualMachine`].

pub mod executor;
pub mod rollbackable;
pub mod vm;

pub use executor::{ExecutedTransaction, PreparedTransaction, TransactionExecutor};
pub use rollbackable::{Rollbackable, Savepoint};
pub use vm::{
    derive_create2_address, derive_create_address, CallKind, CallMessage, VirtualMachine, VmError,
    VmOutcome,
};

// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Block schedulers: the serial reference implementation and the speculative
//! parallel engine, plus the layered snapshot storage and read/write-set
//! conflict tracking they are built from.

pub mod counters;
pub mod error;
pub mod multi_layer_storage;
pub mod read_write_set_storage;
pub mod scheduler_parallel;
pub mod scheduler_serial;

pub use error::SchedulerError;
pub use multi_layer_storage::MultiLayerStorage;
pub use read_write_set_storage::ReadWriteSetStorage;
pub use scheduler_parallel::{ParallelScheduler, DEFAULT_GRAIN_SIZE};
pub use scheduler_serial::SerialScheduler;

#[cfg(test)]
mod unit_tests;

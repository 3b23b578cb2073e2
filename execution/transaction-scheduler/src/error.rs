// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use basalt_state_storage::StorageError;
use basalt_types::ConfigError;
use thiserror::Error;

/// Block-level execution failure. Conflicts are not errors — they retry
/// inside the scheduler and never surface here.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SchedulerError {
    /// Storage or environment failure; the block aborts with no partial
    /// state merged.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Rejected at block-preparation time, before any transaction ran.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A scheduler invariant broke; indicates a bug, not an input problem.
    #[error("scheduler invariant violated: {0}")]
    Fatal(String),
}

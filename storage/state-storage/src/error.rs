// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Storage-layer failures. These are programming or environment errors: they
/// abort the whole block's execution and are never silently retried.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StorageError {
    #[error("storage has no mutable layer")]
    NoMutableLayer,
    #[error("storage already has a mutable layer")]
    DuplicateMutableLayer,
    #[error("storage has no immutable layer")]
    NoImmutableLayer,
    #[error("invalid savepoint {savepoint}, undo log length is {log_len}")]
    InvalidSavepoint { savepoint: usize, log_len: usize },
    #[error("backend storage error: {0}")]
    Backend(String),
}

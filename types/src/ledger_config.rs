// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("unknown feature flag: {0}")]
    UnknownFeature(String),
    #[error("invalid ledger configuration: {0}")]
    Invalid(String),
}

/// Protocol features toggled per chain. Bit positions are wire-stable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeatureFlag {
    Create2 = 0,
    RevertReason = 1,
    TwoPhaseCommit = 2,
    MruCache = 3,
}

impl FeatureFlag {
    const ALL: [FeatureFlag; 4] = [
        FeatureFlag::Create2,
        FeatureFlag::RevertReason,
        FeatureFlag::TwoPhaseCommit,
        FeatureFlag::MruCache,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureFlag::Create2 => "feature_create2",
            FeatureFlag::RevertReason => "feature_revert_reason",
            FeatureFlag::TwoPhaseCommit => "feature_two_phase_commit",
            FeatureFlag::MruCache => "feature_mru_cache",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .iter()
            .find(|flag| flag.name() == name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownFeature(name.to_string()))
    }
}

/// Set of enabled [`FeatureFlag`]s.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Features {
    bits: u64,
}

impl Features {
    pub fn enable(&mut self, flag: FeatureFlag) {
        self.bits |= 1 << flag as u8;
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.bits & (1 << flag as u8) != 0
    }

    /// Parses a genesis/system-config flag list. Unknown names fail here, at
    /// block-preparation time, before any transaction runs.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let mut features = Features::default();
        for name in names {
            features.enable(FeatureFlag::from_name(name.as_ref())?);
        }
        Ok(features)
    }
}

/// Chain-level execution parameters handed to the schedulers alongside every
/// block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    block_gas_limit: u64,
    tx_gas_limit: u64,
    features: Features,
}

impl LedgerConfig {
    pub fn new(block_gas_limit: u64, tx_gas_limit: u64, features: Features) -> Self {
        Self {
            block_gas_limit,
            tx_gas_limit,
            features,
        }
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.block_gas_limit
    }

    pub fn tx_gas_limit(&self) -> u64 {
        self.tx_gas_limit
    }

    pub fn features(&self) -> Features {
        self.features
    }

    /// Sanity-checks the configuration. Schedulers call this before running
    /// the first transaction of a block.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_gas_limit == 0 {
            return Err(ConfigError::Invalid("tx_gas_limit must be non-zero".into()));
        }
        if self.block_gas_limit != 0 && self.tx_gas_limit > self.block_gas_limit {
            return Err(ConfigError::Invalid(
                "tx_gas_limit exceeds block_gas_limit".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            block_gas_limit: 0,
            tx_gas_limit: 3_000_000_000,
            features: Features::default(),
        }
    }
}

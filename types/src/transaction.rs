// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const ADDRESS_LENGTH: usize = 20;

/// A 20-byte account or contract address.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Address([u8; ADDRESS_LENGTH]);

#[derive(Clone, Debug, Error, PartialEq)]
pub enum AddressParseError {
    #[error("address must be {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, AddressParseError> {
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
        let len = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| AddressParseError::InvalidLength(len))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// An ordered-batch member as agreed by consensus. Immutable input to the
/// execution engine: who sends, where to (absent recipient means contract
/// creation), the call payload and the gas allowance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    sender: Address,
    to: Option<Address>,
    input: Bytes,
    gas_limit: u64,
}

impl Transaction {
    pub fn new(sender: Address, to: Option<Address>, input: Bytes, gas_limit: u64) -> Self {
        Self {
            sender,
            to,
            input,
            gas_limit,
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn to(&self) -> Option<Address> {
        self.to
    }

    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    pub fn input(&self) -> &Bytes {
        &self.input
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

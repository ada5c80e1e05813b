// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core types for TipChain: the edges of a tip chain and the identifiers used to look chains up.

use std::{fmt, str::FromStr};

pub use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub mod messages;

/// The identifier of a tip chain on the TipChain contract.
///
/// Serialized as a decimal string; deserialized from either an integer or a decimal/hex string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TipId(pub U256);

impl TipId {
    /// The chain shown when no identifier is configured.
    pub const DEFAULT: Self = Self(U256::ZERO);
}

impl From<u64> for TipId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<TipId> for U256 {
    fn from(value: TipId) -> Self {
        value.0
    }
}

impl fmt::Display for TipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Error returned when parsing a [`TipId`] from a string fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid tip ID: {0}")]
pub struct TipIdParseError(String);

impl FromStr for TipId {
    type Err = TipIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s)
            .map(Self)
            .map_err(|_| TipIdParseError(s.to_owned()))
    }
}

impl Serialize for TipId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TipId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Self::from(value)),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

/// One edge of a tip chain: `from` tipped `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainEntry {
    /// The address that sent the tip.
    pub from: Address,
    /// The address that received the tip.
    pub to: Address,
}

impl ChainEntry {
    /// Creates a new entry.
    pub fn new(from: Address, to: Address) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tipped {}", self.from, self.to)
    }
}

/// Pairs each address with its successor, preserving the order returned by the contract.
///
/// A sequence of `n` addresses yields `n - 1` entries; sequences of length 0 or 1 yield none.
pub fn chain_from_addresses(addresses: &[Address]) -> Vec<ChainEntry> {
    addresses
        .windows(2)
        .map(|pair| ChainEntry::new(pair[0], pair[1]))
        .collect()
}

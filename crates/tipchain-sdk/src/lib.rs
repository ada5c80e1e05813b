// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The TipChain SDK: reads a tip chain from its contract, renders it, and submits tips.
//!
//! A [`ChainViewer`] drives everything. It is wired to three collaborators: a
//! [`WalletSession`] that tells it which account is connected, a [`ContractGateway`] that reads
//! and writes the contract, and a [`Notifier`] that tells the user a tip went through.

pub mod config;
pub mod contract;
pub mod error;
mod metrics;
pub mod notify;
pub mod render;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod viewer;
pub mod wallet;

pub use contract::{ContractGateway, EvmContractGateway, TipReceipt};
pub use error::ViewerError;
pub use metrics::ViewerMetricSet;
pub use notify::Notifier;
pub use render::render;
pub use viewer::{ChainViewer, LoadOutcome, Phase, ViewState, ViewerConfig};
pub use wallet::{LocalWallet, WalletSession};

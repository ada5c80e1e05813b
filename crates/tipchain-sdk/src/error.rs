// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Errors raised by the viewer and by its collaborators.

use alloy::{contract, primitives::TxHash, providers::PendingTransactionError};
use tipchain_core::messages;

/// The user-facing error state of a [`ChainViewer`][crate::viewer::ChainViewer].
///
/// The display text of each variant is the message shown to the user. Underlying causes are
/// logged when the error is raised and are not carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ViewerError {
    /// A tip was requested without a connected account.
    #[error("{}", messages::NO_ACCOUNT)]
    NoAccount,
    /// Reading the chain failed.
    #[error("{}", messages::LOAD_FAILED)]
    LoadFailed,
    /// Submitting, confirming, or following up on a tip failed.
    #[error("{}", messages::TIP_FAILED)]
    TipFailed,
    /// A tip was requested while a load or another tip was in flight.
    #[error("Another operation is in progress")]
    Busy,
    /// The viewer was unmounted; no further state changes are made.
    #[error("The viewer is no longer mounted")]
    Unmounted,
}

/// Errors raised by a [`ContractGateway`][crate::contract::ContractGateway].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The contract call failed, including transport, signing, and decoding failures.
    #[error(transparent)]
    Contract(#[from] contract::Error),
    /// Waiting for the transaction to be mined failed or timed out.
    #[error("failed to confirm the tip transaction: {0}")]
    Confirmation(#[from] PendingTransactionError),
    /// The transaction was mined but reverted.
    #[error("the tip transaction {tx_hash} reverted")]
    Reverted {
        /// The hash of the reverted transaction.
        tx_hash: TxHash,
    },
    /// The wallet refused to sign for the requested account.
    #[error("the wallet rejected the request: {0}")]
    Rejected(String),
    /// The gateway is unreachable or returned an unusable response.
    #[error("the contract gateway is unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`Notifier`][crate::notify::Notifier].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The request could not be sent or its response could not be read.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The notification endpoint answered with a non-success status.
    #[error("the notification endpoint responded with {status}: {body}")]
    Status {
        /// The HTTP status returned.
        status: reqwest::StatusCode,
        /// The response body, if any could be read.
        body: String,
    },
    /// The notification was refused for another reason.
    #[error("the notification was not delivered: {0}")]
    Other(String),
}

/// Errors raised while assembling a wallet session.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// A private key could not be parsed.
    #[error("invalid private key at position {index}: {source}")]
    InvalidKey {
        /// The position of the key in its source.
        index: usize,
        /// The underlying parse error.
        source: alloy::signers::local::LocalSignerError,
    },
    /// The requested account is not held by the wallet.
    #[error("the wallet does not hold account {0}")]
    UnknownAccount(alloy::primitives::Address),
}

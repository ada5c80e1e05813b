// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Access to the TipChain contract.
//!
//! The viewer only talks to the [`ContractGateway`] trait. [`EvmContractGateway`] implements it
//! over an `alloy` HTTP provider.

use std::{fmt, time::Duration};

use alloy::{
    network::{EthereumWallet, ReceiptResponse as _},
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider as _, ProviderBuilder},
    sol,
};
use async_trait::async_trait;
use tipchain_core::TipId;
use url::Url;

use crate::error::GatewayError;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract TipChain {
        function getChain(uint256 tipId) external view returns (address[] memory);
        function tip() external payable;
    }
}

/// The result of a confirmed tip transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipReceipt {
    /// The hash of the tip transaction.
    pub tx_hash: TxHash,
    /// The block in which the transaction was included, if reported.
    pub block_number: Option<u64>,
}

/// A submitted tip transaction that has not been confirmed yet.
#[async_trait]
pub trait PendingTip: Send + fmt::Debug {
    /// The hash of the submitted transaction.
    fn tx_hash(&self) -> TxHash;

    /// Waits until the transaction is mined and checks that it succeeded.
    async fn confirm(self: Box<Self>) -> Result<TipReceipt, GatewayError>;
}

/// Read and write calls against the TipChain contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractGateway: Send + Sync + fmt::Debug {
    /// Returns the ordered address sequence of the chain identified by `tip_id`.
    async fn get_chain(&self, tip_id: TipId) -> Result<Vec<Address>, GatewayError>;

    /// Submits a `tip()` transaction signed by `signer`.
    async fn tip(&self, signer: Address) -> Result<Box<dyn PendingTip>, GatewayError>;
}

/// Settings for tip transactions submitted by an [`EvmContractGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipSettings {
    /// The value attached to each tip, in wei.
    pub value: U256,
    /// The number of confirmations to wait for.
    pub confirmations: u64,
    /// The maximum time to wait for the confirmations.
    pub confirmation_timeout: Duration,
}

impl Default for TipSettings {
    fn default() -> Self {
        Self {
            value: U256::ZERO,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

/// A [`ContractGateway`] for an EVM chain reached over JSON-RPC.
pub struct EvmContractGateway {
    contract: TipChain::TipChainInstance<DynProvider>,
    settings: TipSettings,
}

impl fmt::Debug for EvmContractGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmContractGateway")
            .field("contract_address", self.contract.address())
            .field("settings", &self.settings)
            .finish()
    }
}

impl EvmContractGateway {
    /// Creates a gateway for the contract at `contract_address`, reached through `rpc_url`.
    ///
    /// Without a wallet the gateway can still read the chain, but every tip is rejected by the
    /// provider because nothing can sign it.
    pub fn new(
        rpc_url: Url,
        contract_address: Address,
        wallet: Option<EthereumWallet>,
        settings: TipSettings,
    ) -> Self {
        let provider = match wallet {
            Some(wallet) => ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(rpc_url)
                .erased(),
            None => ProviderBuilder::new().connect_http(rpc_url).erased(),
        };
        tracing::debug!(%contract_address, ?settings, "created contract gateway");

        Self {
            contract: TipChain::new(contract_address, provider),
            settings,
        }
    }

    /// The address of the TipChain contract.
    pub fn contract_address(&self) -> Address {
        *self.contract.address()
    }
}

#[async_trait]
impl ContractGateway for EvmContractGateway {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_chain(&self, tip_id: TipId) -> Result<Vec<Address>, GatewayError> {
        let addresses = self.contract.getChain(tip_id.into()).call().await?;
        tracing::debug!(n_addresses = addresses.len(), "read chain from contract");
        Ok(addresses)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn tip(&self, signer: Address) -> Result<Box<dyn PendingTip>, GatewayError> {
        let pending = self
            .contract
            .tip()
            .from(signer)
            .value(self.settings.value)
            .send()
            .await?;
        tracing::debug!(tx_hash = %pending.tx_hash(), "submitted tip transaction");

        Ok(Box::new(EvmPendingTip {
            inner: pending,
            settings: self.settings,
        }))
    }
}

/// A tip transaction awaiting confirmation on an EVM chain.
struct EvmPendingTip {
    inner: PendingTransactionBuilder<alloy::network::Ethereum>,
    settings: TipSettings,
}

impl fmt::Debug for EvmPendingTip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmPendingTip")
            .field("tx_hash", self.inner.tx_hash())
            .finish()
    }
}

#[async_trait]
impl PendingTip for EvmPendingTip {
    fn tx_hash(&self) -> TxHash {
        *self.inner.tx_hash()
    }

    async fn confirm(self: Box<Self>) -> Result<TipReceipt, GatewayError> {
        let Self { inner, settings } = *self;
        let tx_hash = *inner.tx_hash();
        let receipt = inner
            .with_required_confirmations(settings.confirmations)
            .with_timeout(Some(settings.confirmation_timeout))
            .get_receipt()
            .await?;

        if !receipt.status() {
            return Err(GatewayError::Reverted { tx_hash });
        }
        Ok(TipReceipt {
            tx_hash,
            block_number: receipt.block_number(),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolCall as _;

    use super::*;

    #[test]
    fn abi_signatures_match_contract() {
        assert_eq!(TipChain::getChainCall::SIGNATURE, "getChain(uint256)");
        assert_eq!(TipChain::tipCall::SIGNATURE, "tip()");
    }

    #[test]
    fn get_chain_call_encodes_tip_id() {
        let call = TipChain::getChainCall {
            tipId: U256::from(7),
        };
        let encoded = call.abi_encode();

        assert_eq!(encoded.len(), 4 + 32);
        assert_eq!(&encoded[..4], TipChain::getChainCall::SELECTOR.as_slice());
        assert_eq!(encoded[35], 7);
    }

    #[test]
    fn default_settings_wait_for_one_confirmation() {
        let settings = TipSettings::default();

        assert_eq!(settings.value, U256::ZERO);
        assert_eq!(settings.confirmations, 1);
        assert_eq!(settings.confirmation_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn gateway_reports_its_contract_address() {
        let address = Address::with_last_byte(9);
        let gateway = EvmContractGateway::new(
            "http://127.0.0.1:8545".parse().expect("valid url"),
            address,
            None,
            TipSettings::default(),
        );

        assert_eq!(gateway.contract_address(), address);
    }
}

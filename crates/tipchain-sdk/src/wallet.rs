// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Wallet sessions: which account is connected, and how to sign for it.

use std::{fmt, str::FromStr};

use alloy::{network::EthereumWallet, primitives::Address, signers::local::PrivateKeySigner};
use tokio::sync::watch;

use crate::error::WalletError;

/// The connection to the user's wallet, as seen by the viewer.
pub trait WalletSession: Send + Sync + fmt::Debug {
    /// The currently connected account, if any.
    fn account(&self) -> Option<Address>;

    /// A receiver that observes every change of the connected account.
    fn subscribe(&self) -> watch::Receiver<Option<Address>>;
}

/// A wallet session backed by local private keys.
///
/// The first key is connected initially; [`LocalWallet::select`] and
/// [`LocalWallet::disconnect`] change the connected account and notify subscribers.
pub struct LocalWallet {
    signers: Vec<PrivateKeySigner>,
    active: watch::Sender<Option<Address>>,
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("accounts", &self.accounts())
            .field("active", &self.account())
            .finish()
    }
}

impl LocalWallet {
    /// Creates a wallet holding `signers`, connected to the first one.
    pub fn new(signers: Vec<PrivateKeySigner>) -> Self {
        let initial = signers.first().map(PrivateKeySigner::address);
        let (active, _) = watch::channel(initial);
        Self { signers, active }
    }

    /// Creates a wallet that holds no keys and is never connected.
    pub fn disconnected() -> Self {
        Self::new(Vec::new())
    }

    /// Creates a wallet from hex-encoded private keys.
    pub fn from_private_keys<I, S>(keys: I) -> Result<Self, WalletError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signers = keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| {
                PrivateKeySigner::from_str(key.as_ref().trim())
                    .map_err(|source| WalletError::InvalidKey { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(signers))
    }

    /// All accounts held by the wallet, in key order.
    pub fn accounts(&self) -> Vec<Address> {
        self.signers.iter().map(PrivateKeySigner::address).collect()
    }

    /// Connects `account`, which must be held by the wallet.
    pub fn select(&self, account: Address) -> Result<(), WalletError> {
        if !self.signers.iter().any(|signer| signer.address() == account) {
            return Err(WalletError::UnknownAccount(account));
        }
        self.set_active(Some(account));
        Ok(())
    }

    /// Connects the account at position `index` of [`LocalWallet::accounts`].
    pub fn select_index(&self, index: usize) -> Option<Address> {
        let account = self.signers.get(index)?.address();
        self.set_active(Some(account));
        Some(account)
    }

    /// Disconnects the current account.
    pub fn disconnect(&self) {
        self.set_active(None);
    }

    /// Builds the signing wallet used by a contract gateway, or `None` if no key is held.
    ///
    /// Every held key is registered so that any connected account can sign.
    pub fn ethereum_wallet(&self) -> Option<EthereumWallet> {
        let (first, rest) = self.signers.split_first()?;
        let mut wallet = EthereumWallet::new(first.clone());
        for signer in rest {
            wallet.register_signer(signer.clone());
        }
        Some(wallet)
    }

    fn set_active(&self, account: Option<Address>) {
        let changed = self.active.send_if_modified(|current| {
            if *current == account {
                return false;
            }
            *current = account;
            true
        });
        if changed {
            tracing::info!(?account, "connected account changed");
        }
    }
}

impl WalletSession for LocalWallet {
    fn account(&self) -> Option<Address> {
        *self.active.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.active.subscribe()
    }
}

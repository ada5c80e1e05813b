// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Configuration of the TipChain client.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use alloy::primitives::{Address, U256, address};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use tipchain_core::TipId;
use tipchain_utils::{default_configuration_paths, load_from_yaml, path_or_defaults_if_exist};
use url::Url;

use crate::{
    contract::{EvmContractGateway, TipSettings},
    notify::{HttpNotifier, LogNotifier, Notifier},
    viewer::ViewerConfig,
    wallet::LocalWallet,
};

/// The file names searched for when no configuration path is given.
pub const CONFIG_FILE_NAME: &str = "tipchain_config.yaml";

/// The deployed TipChain contract.
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("0x97cEB99cb674f2c3ac2EB7D2a57C7eCEc54B38D8");

/// Loads the TipChain configuration from the given path.
///
/// If no path is provided, tries the current directory, then `$XDG_CONFIG_HOME`, then
/// `~/.config/tipchain`, then `~/.tipchain`.
pub fn load_configuration(path: Option<impl AsRef<Path>>) -> Result<ClientConfig> {
    let path = path_or_defaults_if_exist(
        path,
        &default_configuration_paths("tipchain", CONFIG_FILE_NAME),
    )
    .ok_or(anyhow!("could not find a valid TipChain configuration file"))?;
    tracing::info!("using TipChain configuration from '{}'", path.display());
    load_from_yaml(&path)
}

/// Config for the client.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// The JSON-RPC endpoint of the chain node.
    pub rpc_url: Url,
    /// The address of the TipChain contract.
    #[serde(default = "defaults::contract_address")]
    pub contract_address: Address,
    /// The chain to display.
    #[serde(default)]
    pub tip_id: TipId,
    /// The value attached to each tip, in wei.
    #[serde(default)]
    pub tip_value_wei: u64,
    /// The number of confirmations to wait for after submitting a tip.
    #[serde(default = "defaults::confirmations")]
    pub confirmations: u64,
    /// The maximum time to wait for a tip to be confirmed.
    #[serde_as(as = "DurationSeconds")]
    #[serde(
        rename = "confirmation_timeout_secs",
        default = "defaults::confirmation_timeout"
    )]
    pub confirmation_timeout: Duration,
    /// Where the wallet keys come from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletConfig>,
    /// The notification endpoint; notifications are only logged if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,
}

impl ClientConfig {
    /// Creates a configuration for `rpc_url` with default values for everything else.
    pub fn new_for_rpc_url(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            contract_address: defaults::contract_address(),
            tip_id: TipId::DEFAULT,
            tip_value_wei: 0,
            confirmations: defaults::confirmations(),
            confirmation_timeout: defaults::confirmation_timeout(),
            wallet: None,
            notification: None,
        }
    }

    /// The settings for submitted tips.
    pub fn tip_settings(&self) -> TipSettings {
        TipSettings {
            value: U256::from(self.tip_value_wei),
            confirmations: self.confirmations,
            confirmation_timeout: self.confirmation_timeout,
        }
    }

    /// The settings for the viewer.
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            tip_id: self.tip_id,
        }
    }

    /// Loads the wallet described by [`ClientConfig::wallet`].
    pub fn load_wallet(&self) -> Result<LocalWallet> {
        WalletConfig::load_wallet(self.wallet.as_ref())
    }

    /// Creates a contract gateway that signs with the keys held by `wallet`.
    pub fn new_gateway(&self, wallet: &LocalWallet) -> EvmContractGateway {
        EvmContractGateway::new(
            self.rpc_url.clone(),
            self.contract_address,
            wallet.ethereum_wallet(),
            self.tip_settings(),
        )
    }

    /// Creates the notifier for the configured endpoint, or a logging notifier.
    pub fn new_notifier(&self) -> Result<Arc<dyn Notifier>> {
        match &self.notification {
            Some(config) => Ok(Arc::new(
                HttpNotifier::new(config).context("failed to create the notification client")?,
            )),
            None => Ok(Arc::new(LogNotifier)),
        }
    }
}

/// Where to find the private keys of the wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    /// A file with one hex-encoded private key per line. Empty lines and lines starting with `#`
    /// are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// An environment variable holding comma-separated hex-encoded private keys.
    ///
    /// Consulted only if `key_file` is not set; defaults to [`WalletConfig::DEFAULT_KEY_ENV`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
}

impl WalletConfig {
    /// The environment variable read when no key source is configured.
    pub const DEFAULT_KEY_ENV: &'static str = "TIPCHAIN_PRIVATE_KEYS";

    /// Creates a wallet config that reads keys from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            key_file: Some(path.as_ref().to_path_buf()),
            key_env: None,
        }
    }

    /// Loads the wallet from the given config, or from the default environment variable.
    ///
    /// A missing environment variable yields a wallet without accounts, so that the chain can
    /// still be read.
    pub fn load_wallet(config: Option<&WalletConfig>) -> Result<LocalWallet> {
        let default_config = WalletConfig::default();
        let config = config.unwrap_or(&default_config);

        let keys: Vec<String> = if let Some(path) = &config.key_file {
            std::fs::read_to_string(path)
                .with_context(|| format!("unable to read wallet keys from {}", path.display()))?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_owned)
                .collect()
        } else {
            let variable = config.key_env.as_deref().unwrap_or(Self::DEFAULT_KEY_ENV);
            match std::env::var(variable) {
                Ok(value) => value
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .collect(),
                Err(_) => {
                    tracing::info!(variable, "no wallet keys found; the wallet is disconnected");
                    Vec::new()
                }
            }
        };

        let wallet = LocalWallet::from_private_keys(keys)?;
        tracing::debug!(?wallet, "loaded wallet");
        Ok(wallet)
    }
}

/// The mini-app notification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    /// The URL notifications are posted to.
    pub url: Url,
    /// The notification token issued to the user by the mini-app host.
    pub token: String,
    /// The URL opened when the user clicks the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<Url>,
}

mod defaults {
    use std::time::Duration;

    use alloy::primitives::Address;

    pub fn contract_address() -> Address {
        super::DEFAULT_CONTRACT_ADDRESS
    }

    pub fn confirmations() -> u64 {
        1
    }

    pub fn confirmation_timeout() -> Duration {
        Duration::from_secs(120)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use indoc::indoc;

    use super::*;

    const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file can be created");
        file.write_all(contents.as_bytes()).expect("write succeeds");
        file
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ClientConfig =
            serde_yaml::from_str("rpc_url: https://mainnet.base.org\n").expect("valid config");

        assert_eq!(
            config,
            ClientConfig::new_for_rpc_url("https://mainnet.base.org".parse().expect("valid url"))
        );
        assert_eq!(config.contract_address, DEFAULT_CONTRACT_ADDRESS);
        assert_eq!(config.tip_settings(), TipSettings::default());
        assert_eq!(config.viewer_config().tip_id, TipId::DEFAULT);
    }

    #[test]
    fn full_config_parses() {
        let yaml = indoc! {"
            rpc_url: http://127.0.0.1:8545
            contract_address: '0x0000000000000000000000000000000000000009'
            tip_id: 3
            tip_value_wei: 1000
            confirmations: 2
            confirmation_timeout_secs: 30
            wallet:
              key_env: MY_KEYS
            notification:
              url: https://api.example.com/notify
              token: abc
        "};
        let config: ClientConfig = serde_yaml::from_str(yaml).expect("valid config");

        assert_eq!(config.contract_address, Address::with_last_byte(9));
        assert_eq!(config.tip_id, TipId::from(3));
        assert_eq!(
            config.tip_settings(),
            TipSettings {
                value: U256::from(1000),
                confirmations: 2,
                confirmation_timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(
            config.wallet.as_ref().and_then(|wallet| wallet.key_env.as_deref()),
            Some("MY_KEYS")
        );
        assert_eq!(
            config.notification.as_ref().map(|n| n.token.as_str()),
            Some("abc")
        );
    }

    #[test]
    fn config_round_trips_through_yaml_file() {
        let mut config =
            ClientConfig::new_for_rpc_url("http://127.0.0.1:8545".parse().expect("valid url"));
        config.tip_id = TipId::from(11);
        let file = write_temp(&serde_yaml::to_string(&config).expect("config serializes"));

        let loaded = load_configuration(Some(file.path())).expect("config loads");
        assert_eq!(loaded, config);
    }

    #[test]
    fn wallet_keys_are_read_from_file() {
        let file = write_temp(&format!("# dev key\n\n{KEY_0}\n"));

        let wallet = WalletConfig::load_wallet(Some(&WalletConfig::from_path(file.path())))
            .expect("wallet loads");
        assert_eq!(wallet.accounts().len(), 1);
    }

    #[test]
    fn missing_key_env_yields_disconnected_wallet() {
        let config = WalletConfig {
            key_file: None,
            key_env: Some("TIPCHAIN_TEST_KEYS_THAT_ARE_NEVER_SET".to_owned()),
        };

        let wallet = WalletConfig::load_wallet(Some(&config)).expect("wallet loads");
        assert!(wallet.accounts().is_empty());
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let config = WalletConfig::from_path("/definitely/not/here.keys");

        assert!(WalletConfig::load_wallet(Some(&config)).is_err());
    }

    #[tokio::test]
    async fn notifier_defaults_to_logging() {
        let config =
            ClientConfig::new_for_rpc_url("http://127.0.0.1:8545".parse().expect("valid url"));
        let notifier = config.new_notifier().expect("notifier builds");

        notifier
            .send(&tipchain_core::messages::Notification::tip_sent())
            .await
            .expect("logging notifier succeeds");
    }
}

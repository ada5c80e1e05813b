// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The TipChain terminal client.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tipchain_core::TipId;
use tipchain_sdk::{
    ChainViewer,
    LocalWallet,
    config::{ClientConfig, load_configuration},
    render,
};
use tipchain_utils::{init_tracing_subscriber, metrics::Registry};

mod watch;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    about = "Show a TipChain chain and continue it with a tip",
    long_about = None,
    name = env!("CARGO_BIN_NAME"),
    version,
)]
#[clap(rename_all = "kebab-case")]
struct Args {
    /// The path to the client configuration file.
    ///
    /// If omitted, `tipchain_config.yaml` is looked up in the current directory, then in
    /// `$XDG_CONFIG_HOME`, `~/.config/tipchain`, and `~/.tipchain`.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Show this chain instead of the one set in the configuration.
    #[arg(long)]
    tip_id: Option<TipId>,
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Load the chain once and print it.
    Show,
    /// Submit one tip from the connected account, then print the chain.
    Tip,
    /// Follow the connected account and read commands from stdin.
    ///
    /// Commands: `tip`, `reload`, `account <index>`, `disconnect`, `metrics`, `quit`.
    Watch,
}

/// The viewer together with the handles the front-end needs.
#[derive(Debug)]
pub(crate) struct App {
    pub viewer: Arc<ChainViewer>,
    pub wallet: Arc<LocalWallet>,
    pub registry: Registry,
}

impl App {
    fn new(config: &ClientConfig) -> Result<Self> {
        let wallet = Arc::new(config.load_wallet()?);
        let gateway = Arc::new(config.new_gateway(&wallet));
        let notifier = config.new_notifier()?;
        let registry = Registry::default();
        let viewer = Arc::new(ChainViewer::new(
            config.viewer_config(),
            wallet.clone(),
            gateway,
            notifier,
            &registry,
        ));
        Ok(Self {
            viewer,
            wallet,
            registry,
        })
    }

    fn print_view(&self) {
        print!("{}", render(&self.viewer.snapshot()));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing_subscriber()?;

    let mut config = load_configuration(args.config.as_ref())?;
    if let Some(tip_id) = args.tip_id {
        config.tip_id = tip_id;
    }
    tracing::debug!(?config, "loaded configuration");
    let app = App::new(&config).context("failed to set up the chain viewer")?;

    match args.command {
        Command::Show => {
            if let Err(error) = app.viewer.load_chain().await {
                tracing::debug!(%error, "chain load failed");
            }
            app.print_view();
        }
        Command::Tip => {
            match app.viewer.submit_tip().await {
                Ok(receipt) => println!("Tip confirmed in transaction {}", receipt.tx_hash),
                Err(error) => tracing::debug!(%error, "tip failed"),
            }
            app.print_view();
        }
        Command::Watch => watch::run(&app).await?,
    }
    Ok(())
}

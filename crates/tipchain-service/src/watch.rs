// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The interactive `watch` front-end.

use std::{str::FromStr, sync::Arc};

use anyhow::Result;
use tipchain_sdk::{ChainViewer, ViewerError, render};
use tokio::io::{AsyncBufReadExt as _, BufReader};

use crate::App;

const HELP: &str = "commands: tip | reload | account <index> | disconnect | metrics | quit";

/// A line read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchCommand {
    Tip,
    Reload,
    Account(usize),
    Disconnect,
    Metrics,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ParseCommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'account' takes the index of an account, e.g. 'account 1'")]
    InvalidIndex,
}

impl FromStr for WatchCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = match words.next().unwrap_or_default() {
            "tip" => Self::Tip,
            "reload" => Self::Reload,
            "account" => {
                let index = words
                    .next()
                    .and_then(|index| index.parse().ok())
                    .ok_or(ParseCommandError::InvalidIndex)?;
                Self::Account(index)
            }
            "disconnect" => Self::Disconnect,
            "metrics" => Self::Metrics,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_owned())),
        };
        match words.next() {
            Some(extra) => Err(ParseCommandError::Unknown(extra.to_owned())),
            None => Ok(command),
        }
    }
}

/// Mounts the viewer, re-renders on every state change, and executes commands from stdin until
/// `quit`, end of input, or Ctrl-C.
pub(crate) async fn run(app: &App) -> Result<()> {
    let watcher = app.viewer.mount();
    let mut states = app.viewer.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    states.borrow_and_update();
    app.print_view();
    println!("{HELP}");

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                print!("\n{}", render(&states.borrow_and_update()));
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse() {
                    Ok(WatchCommand::Quit) => break,
                    Ok(command) => execute(app, command)?,
                    Err(error) => println!("{error}; {HELP}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.viewer.unmount();
    watcher.await?;
    Ok(())
}

fn execute(app: &App, command: WatchCommand) -> Result<()> {
    match command {
        WatchCommand::Tip => spawn_tip(Arc::clone(&app.viewer)),
        WatchCommand::Reload => {
            let viewer = Arc::clone(&app.viewer);
            tokio::spawn(async move {
                if let Err(error) = viewer.load_chain().await {
                    tracing::debug!(%error, "reload failed");
                }
            });
        }
        WatchCommand::Account(index) => match app.wallet.select_index(index) {
            Some(account) => println!("connected {account}"),
            None => println!("no account at index {index}"),
        },
        WatchCommand::Disconnect => {
            app.wallet.disconnect();
            println!("disconnected");
        }
        WatchCommand::Metrics => print!("{}", app.registry.encode_text()?),
        WatchCommand::Quit => {}
    }
    Ok(())
}

fn spawn_tip(viewer: Arc<ChainViewer>) {
    tokio::spawn(async move {
        match viewer.submit_tip().await {
            Ok(receipt) => println!("Tip confirmed in transaction {}", receipt.tx_hash),
            Err(ViewerError::Busy) => println!("{}", ViewerError::Busy),
            Err(error) => tracing::debug!(%error, "tip failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tip", WatchCommand::Tip)]
    #[case("  reload ", WatchCommand::Reload)]
    #[case("account 2", WatchCommand::Account(2))]
    #[case("disconnect", WatchCommand::Disconnect)]
    #[case("metrics", WatchCommand::Metrics)]
    #[case("quit", WatchCommand::Quit)]
    #[case("exit", WatchCommand::Quit)]
    fn parses_commands(#[case] line: &str, #[case] expected: WatchCommand) {
        assert_eq!(line.parse::<WatchCommand>(), Ok(expected));
    }

    #[rstest]
    #[case("account", ParseCommandError::InvalidIndex)]
    #[case("account one", ParseCommandError::InvalidIndex)]
    #[case("send", ParseCommandError::Unknown("send".to_owned()))]
    #[case("tip now", ParseCommandError::Unknown("now".to_owned()))]
    fn rejects_malformed_commands(#[case] line: &str, #[case] expected: ParseCommandError) {
        assert_eq!(line.parse::<WatchCommand>(), Err(expected));
    }
}

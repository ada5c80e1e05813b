// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Rendering of a [`ViewState`] into the elements a front-end displays.

use std::fmt;

use tipchain_core::ChainEntry;

use crate::viewer::ViewState;

/// The heading shown above the chain.
pub const TITLE: &str = "TipChain Chat";
/// Shown while the chain is being read.
pub const LOADING_TEXT: &str = "Loading chain data...";
/// Shown instead of the entries when the chain is empty.
pub const EMPTY_CHAIN_TEXT: &str = "No tips in the chain yet.";
/// The label of the tip button when no tip is in flight.
pub const TIP_LABEL: &str = "Tip and continue the chain";
/// The label of the tip button while a tip is in flight.
pub const TIPPING_LABEL: &str = "Tipping...";

/// The elements to display for one view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The loading indicator, shown while the chain is read.
    pub loading: Option<&'static str>,
    /// The error text of the last failed operation.
    pub error: Option<String>,
    /// The chain and the tip button, shown when nothing is loading and nothing failed.
    pub content: Option<ChainView>,
}

/// The chain list together with the tip button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainView {
    /// The chain entries.
    pub list: ChainList,
    /// The button that submits a tip.
    pub button: TipButton,
}

/// The displayed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainList {
    /// The chain has no entries yet.
    Empty,
    /// One line per entry, in chain order.
    Entries(Vec<String>),
}

/// The tip button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipButton {
    /// The button text.
    pub label: &'static str,
    /// Whether clicks are ignored.
    pub disabled: bool,
}

impl TipButton {
    fn for_state(tip_in_progress: bool) -> Self {
        Self {
            label: if tip_in_progress {
                TIPPING_LABEL
            } else {
                TIP_LABEL
            },
            disabled: tip_in_progress,
        }
    }
}

/// Computes what to display for `state`.
pub fn render(state: &ViewState) -> Rendered {
    let content = (!state.loading && state.error.is_none()).then(|| ChainView {
        list: if state.chain.is_empty() {
            ChainList::Empty
        } else {
            ChainList::Entries(state.chain.iter().map(ChainEntry::to_string).collect())
        },
        button: TipButton::for_state(state.tip_in_progress),
    });

    Rendered {
        loading: state.loading.then_some(LOADING_TEXT),
        error: state.error.map(|error| error.to_string()),
        content,
    }
}

impl fmt::Display for TipButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {} ]", self.label)?;
        if self.disabled {
            write!(f, " (disabled)")?;
        }
        Ok(())
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{TITLE}")?;
        if let Some(loading) = self.loading {
            writeln!(f, "{loading}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "{error}")?;
        }
        if let Some(content) = &self.content {
            match &content.list {
                ChainList::Empty => writeln!(f, "{EMPTY_CHAIN_TEXT}")?,
                ChainList::Entries(lines) => {
                    for line in lines {
                        writeln!(f, "{line}")?;
                    }
                }
            }
            writeln!(f, "{}", content.button)?;
        }
        Ok(())
    }
}

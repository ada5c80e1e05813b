// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Fixed user-facing texts and the notification sent after a successful tip.

use serde::{Deserialize, Serialize};

/// Shown when reading the chain fails for any reason.
pub const LOAD_FAILED: &str = "Failed to load chain data";
/// Shown when any step of a tip fails.
pub const TIP_FAILED: &str = "Failed to send tip";
/// Shown when a tip is attempted without a connected account.
pub const NO_ACCOUNT: &str = "Connect your wallet to tip";

/// A notification delivered to the user through the mini-app host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// The notification title.
    pub title: String,
    /// The notification body.
    pub body: String,
}

impl Notification {
    /// Creates a new notification.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// The notification sent once a tip is confirmed and the chain reloaded.
    pub fn tip_sent() -> Self {
        Self::new(
            "Tip sent!",
            "You successfully tipped and continued the chain.",
        )
    }
}

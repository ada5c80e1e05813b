// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Notifications sent through the mini-app host after a successful tip.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tipchain_core::messages::Notification;
use url::Url;
use uuid::Uuid;

use crate::{config::NotificationConfig, error::NotifyError};

/// Delivers notifications to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Sends `notification`; delivery is best effort.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// A notifier that only logs, for setups without a notification endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            "notification (no endpoint configured)"
        );
        Ok(())
    }
}

/// The request body accepted by mini-app notification endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationRequest<'a> {
    notification_id: String,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    tokens: [&'a str; 1],
}

/// The response body of mini-app notification endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationResponse {
    #[serde(default)]
    result: SendNotificationResult,
}

impl SendNotificationResponse {
    /// Decodes a success body; an unreadable body is logged and treated as delivered.
    fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(body).unwrap_or_else(|error| {
            tracing::warn!(%error, "couldn't decode notification response; assuming delivery");
            Self::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationResult {
    #[serde(default)]
    invalid_tokens: Vec<String>,
    #[serde(default)]
    rate_limited_tokens: Vec<String>,
}

/// A notifier that posts to a mini-app notification endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: Url,
    token: String,
    target_url: Option<Url>,
}

impl HttpNotifier {
    /// The timeout applied to each notification request.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a notifier for the configured endpoint.
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            target_url: config.target_url.clone(),
        })
    }

    fn request_body<'a>(&'a self, notification: &'a Notification) -> SendNotificationRequest<'a> {
        SendNotificationRequest {
            notification_id: Uuid::now_v7().simple().to_string(),
            title: &notification.title,
            body: &notification.body,
            target_url: self.target_url.as_ref().map(Url::as_str),
            tokens: [self.token.as_str()],
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&self.request_body(notification))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => format!("couldn't decode response body; {error}"),
            };
            return Err(NotifyError::Status { status, body });
        }

        let parsed = SendNotificationResponse::from_body(&response.bytes().await?);
        if !parsed.result.invalid_tokens.is_empty() {
            return Err(NotifyError::Other("the notification token is invalid".to_owned()));
        }
        if !parsed.result.rate_limited_tokens.is_empty() {
            tracing::warn!("notification was rate limited");
        }
        tracing::debug!(url = %self.url, "notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(target_url: Option<&str>) -> HttpNotifier {
        HttpNotifier::new(&NotificationConfig {
            url: "https://api.example.com/notify".parse().expect("valid url"),
            token: "token-1".to_owned(),
            target_url: target_url.map(|url| url.parse().expect("valid url")),
        })
        .expect("client builds")
    }

    #[test]
    fn request_body_uses_camel_case_fields() {
        let notifier = notifier(Some("https://tipchain.example.com/"));
        let notification = Notification::tip_sent();
        let body = serde_json::to_value(notifier.request_body(&notification))
            .expect("request serializes");

        assert_eq!(body["title"], "Tip sent!");
        assert_eq!(
            body["body"],
            "You successfully tipped and continued the chain."
        );
        assert_eq!(body["targetUrl"], "https://tipchain.example.com/");
        assert_eq!(body["tokens"], serde_json::json!(["token-1"]));
        assert_eq!(
            body["notificationId"]
                .as_str()
                .expect("id is a string")
                .len(),
            32
        );
    }

    #[test]
    fn request_body_omits_missing_target_url() {
        let notifier = notifier(None);
        let notification = Notification::new("t", "b");
        let body = serde_json::to_value(notifier.request_body(&notification))
            .expect("request serializes");

        assert!(body.get("targetUrl").is_none());
    }

    #[test]
    fn each_request_gets_a_fresh_id() {
        let notifier = notifier(None);
        let notification = Notification::tip_sent();

        assert_ne!(
            notifier.request_body(&notification).notification_id,
            notifier.request_body(&notification).notification_id
        );
    }

    #[test]
    fn response_without_result_parses() {
        let parsed: SendNotificationResponse =
            serde_json::from_str("{}").expect("empty object parses");

        assert!(parsed.result.invalid_tokens.is_empty());
    }

    #[test]
    fn response_lists_rejected_tokens() {
        let parsed = SendNotificationResponse::from_body(
            br#"{"result":{"successfulTokens":[],"invalidTokens":["token-1"],"rateLimitedTokens":[]}}"#,
        );

        assert_eq!(parsed.result.invalid_tokens, vec!["token-1".to_owned()]);
        assert!(parsed.result.rate_limited_tokens.is_empty());
    }

    #[test]
    fn unreadable_success_body_counts_as_delivered() {
        for body in [&b""[..], b"not json", br#"{"result":{"invalidTokens":7}}"#] {
            let parsed = SendNotificationResponse::from_body(body);

            assert!(parsed.result.invalid_tokens.is_empty());
            assert!(parsed.result.rate_limited_tokens.is_empty());
        }
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        LogNotifier
            .send(&Notification::tip_sent())
            .await
            .expect("logging never fails");
    }
}

//! Browser push delivery.
//!
//! Web-push encryption and VAPID signing are delegated to a push gateway;
//! this module only speaks the gateway's JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result};
use crate::provider::http_client;

const PROVIDER: &str = "push";

/// Notification payload shown by the service worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Campaign id echoed back by click/close tracking beacons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: None,
            icon: None,
            campaign_id: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTarget {
    pub endpoint: String,
    pub keys: PushKeys,
}

impl PushTarget {
    pub fn new(endpoint: impl Into<String>, p256dh: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: PushKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }
}

/// Trait for delivering push notifications.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<()>;
}

/// Outcome of a fan-out delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub sent: usize,
    pub failed: usize,
    /// Endpoints the push service reported as gone (404/410).
    pub expired: Vec<String>,
}

/// Send to every target. Individual failures are counted, never returned.
pub async fn send_all(sender: &dyn PushSender, targets: &[PushTarget], message: &PushMessage) -> PushReport {
    let mut report = PushReport::default();

    for target in targets {
        match sender.send(target, message).await {
            Ok(()) => report.sent += 1,
            Err(ProviderError::Api { status: 404 | 410, .. }) => {
                debug!(endpoint = %target.endpoint, "Push subscription expired");
                report.failed += 1;
                report.expired.push(target.endpoint.clone());
            }
            Err(e) => {
                warn!(endpoint = %target.endpoint, error = %e, "Push delivery failed");
                report.failed += 1;
            }
        }
    }

    info!(sent = report.sent, failed = report.failed, "Push fan-out finished");
    report
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    subscription: &'a PushTarget,
    payload: &'a PushMessage,
}

/// Sends through a web-push gateway (`POST {base_url}/send`).
#[derive(Debug, Clone)]
pub struct GatewayPushSender {
    http: Client,
    base_url: String,
}

impl GatewayPushSender {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
        })
    }

    pub fn send_url(&self) -> String {
        format!("{}/send", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PushSender for GatewayPushSender {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<()> {
        let resp = self
            .http
            .post(self.send_url())
            .json(&GatewayRequest {
                subscription: target,
                payload: message,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Logs notifications instead of sending them. Used when no gateway is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingPushSender;

#[async_trait]
impl PushSender for LoggingPushSender {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<()> {
        info!(
            endpoint = %target.endpoint,
            title = %message.title,
            body = %message.body,
            "Push notification (not delivered)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_gateway_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_partial_json(json!({
                "subscription": { "endpoint": "https://push.example/a", "keys": { "p256dh": "p", "auth": "s" } },
                "payload": { "title": "Offer", "body": "Use SAVE10" }
            })))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let sender = GatewayPushSender::new(server.uri()).unwrap();
        sender
            .send(
                &PushTarget::new("https://push.example/a", "p", "s"),
                &PushMessage::new("Offer", "Use SAVE10"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_all_counts_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "subscription": { "endpoint": "https://push.example/gone" } })))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "subscription": { "endpoint": "https://push.example/broken" } })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let sender = GatewayPushSender::new(server.uri()).unwrap();
        let targets = vec![
            PushTarget::new("https://push.example/ok", "p", "s"),
            PushTarget::new("https://push.example/gone", "p", "s"),
            PushTarget::new("https://push.example/broken", "p", "s"),
        ];
        let report = send_all(&sender, &targets, &PushMessage::new("t", "b")).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.expired, vec!["https://push.example/gone".to_string()]);
    }

    #[test]
    fn test_message_omits_empty_fields() {
        let value = serde_json::to_value(PushMessage::new("t", "b")).unwrap();
        assert_eq!(value, json!({ "title": "t", "body": "b" }));
    }
}

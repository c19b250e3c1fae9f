//! Slack Web API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SlackConfig;
use crate::error::{ProviderError, Result};
use crate::provider::{http_client, read_json, wrong_message, MessageProvider};
use crate::types::{Channel, ConnectionInfo, OutboundMessage, ProviderKind, SendReceipt};

const PROVIDER: &str = "slack";
const CHANNEL_PAGE_SIZE: u32 = 200;

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

/// Every Slack response carries `ok` and, on failure, `error`.
#[derive(Debug, Deserialize)]
struct SlackEnvelope<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    ts: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestBody {
    team: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsBody {
    #[serde(default)]
    channels: Vec<Channel>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    next_cursor: Option<String>,
}

/// Client for a Slack bot token.
#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    config: SlackConfig,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.config.base_url)
            .field("default_channel", &self.config.default_channel)
            .finish()
    }
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    fn unwrap_envelope<T>(envelope: SlackEnvelope<T>) -> Result<T> {
        if envelope.ok {
            Ok(envelope.body)
        } else {
            Err(ProviderError::Rejected {
                provider: PROVIDER,
                message: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            })
        }
    }

    /// Post a message to a channel.
    pub async fn post_message(&self, channel: Option<&str>, text: &str) -> Result<SendReceipt> {
        let channel = channel
            .or(self.config.default_channel.as_deref())
            .ok_or_else(|| ProviderError::Config("slack: no channel given and no defaultChannel".to_string()))?;

        debug!(channel, "Posting Slack message");
        let resp = self
            .http
            .post(self.config.method_url("chat.postMessage"))
            .bearer_auth(&self.config.bot_token)
            .json(&PostMessage { channel, text })
            .send()
            .await?;
        let body: PostMessageBody = Self::unwrap_envelope(read_json(PROVIDER, resp).await?)?;
        info!(channel = ?body.channel, "Slack message posted");

        Ok(SendReceipt {
            provider: ProviderKind::Slack,
            message_id: body.ts,
            status: Some("sent".to_string()),
        })
    }
}

#[async_trait]
impl MessageProvider for SlackClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Slack
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        match message {
            OutboundMessage::Slack { channel, text } => self.post_message(channel.as_deref(), text).await,
            other => Err(wrong_message(self.kind(), other)),
        }
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let resp = self
            .http
            .post(self.config.method_url("auth.test"))
            .bearer_auth(&self.config.bot_token)
            .send()
            .await?;
        let body: AuthTestBody = Self::unwrap_envelope(read_json(PROVIDER, resp).await?)?;

        Ok(ConnectionInfo {
            provider: ProviderKind::Slack,
            account: format!(
                "{} ({})",
                body.team.unwrap_or_default(),
                body.user.unwrap_or_default()
            ),
        })
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.config.method_url("conversations.list"))
                .bearer_auth(&self.config.bot_token)
                .query(&[
                    ("types", "public_channel,private_channel".to_string()),
                    ("exclude_archived", "true".to_string()),
                    ("limit", CHANNEL_PAGE_SIZE.to_string()),
                ]);
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor)]);
            }

            let page: ConversationsBody = Self::unwrap_envelope(read_json(PROVIDER, request.send().await?).await?)?;
            channels.extend(page.channels);

            cursor = page
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, default_channel: Option<&str>) -> SlackClient {
        SlackClient::new(SlackConfig {
            bot_token: "xoxb-test".to_string(),
            default_channel: default_channel.map(str::to_string),
            base_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_post_message_uses_default_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(json!({ "channel": "C01", "text": "hello" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1700.01", "channel": "C01" })),
            )
            .mount(&server)
            .await;

        let receipt = client(&server, Some("C01"))
            .send(&OutboundMessage::Slack {
                channel: None,
                text: "hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("1700.01"));
    }

    #[tokio::test]
    async fn test_slack_error_body_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "invalid_auth" })))
            .mount(&server)
            .await;

        let err = client(&server, None).test_connection().await.unwrap_err();
        match err {
            ProviderError::Rejected { message, .. } => assert_eq!(message, "invalid_auth"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_channels_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C02", "name": "sales", "is_private": true }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "C01", "name": "general" }],
                "response_metadata": { "next_cursor": "page2" }
            })))
            .mount(&server)
            .await;

        let channels = client(&server, None).list_channels().await.unwrap();
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "sales"]);
    }

    #[tokio::test]
    async fn test_missing_channel_is_config_error() {
        let server = MockServer::start().await;
        let err = client(&server, None).post_message(None, "hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}

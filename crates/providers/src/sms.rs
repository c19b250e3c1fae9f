//! Twilio Programmable Messaging client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SmsConfig;
use crate::error::{ProviderError, Result};
use crate::provider::{http_client, read_json, wrong_message, MessageProvider};
use crate::types::{ConnectionInfo, OutboundMessage, ProviderKind, SendReceipt};

const PROVIDER: &str = "sms";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    friendly_name: Option<String>,
    status: Option<String>,
}

/// Client for a Twilio account.
#[derive(Clone)]
pub struct SmsClient {
    http: Client,
    config: SmsConfig,
}

impl std::fmt::Debug for SmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsClient")
            .field("account_sid", &self.config.account_sid)
            .field("from_phone", &self.config.from_phone)
            .finish()
    }
}

impl SmsClient {
    pub fn new(config: SmsConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    /// Send a text message.
    pub async fn send_sms(&self, to: &str, from: Option<&str>, body: &str) -> Result<SendReceipt> {
        let from = from
            .or(self.config.from_phone.as_deref())
            .ok_or_else(|| ProviderError::Config("sms: no sender phone configured".to_string()))?;

        debug!(to, "Sending SMS");
        let resp = self
            .http
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;
        let message: MessageResponse = read_json(PROVIDER, resp).await?;
        info!(sid = ?message.sid, "SMS queued");

        Ok(SendReceipt {
            provider: ProviderKind::Sms,
            message_id: message.sid,
            status: message.status,
        })
    }
}

#[async_trait]
impl MessageProvider for SmsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sms
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        match message {
            OutboundMessage::Sms { to, from, body } => self.send_sms(to, from.as_deref(), body).await,
            other => Err(wrong_message(self.kind(), other)),
        }
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let resp = self
            .http
            .get(self.config.account_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await?;
        let account: AccountResponse = read_json(PROVIDER, resp).await?;

        if account.status.as_deref().is_some_and(|s| s != "active") {
            return Err(ProviderError::Rejected {
                provider: PROVIDER,
                message: format!("account status is {}", account.status.unwrap_or_default()),
            });
        }

        Ok(ConnectionInfo {
            provider: ProviderKind::Sms,
            account: account
                .friendly_name
                .unwrap_or_else(|| self.config.account_sid.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SmsClient {
        SmsClient::new(SmsConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            from_phone: Some("+15550000000".to_string()),
            base_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_sms_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15551112222"))
            .and(body_string_contains("From=%2B15550000000"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM1", "status": "queued" })),
            )
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send(&OutboundMessage::Sms {
                to: "+15551112222".to_string(),
                from: None,
                body: "Your code is SAVE10".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("SM1"));
        assert_eq!(receipt.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn test_suspended_account_fails_connection_test() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2010-04-01/Accounts/AC123.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "friendly_name": "Acme",
                "status": "suspended"
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).test_connection().await,
            Err(ProviderError::Rejected { .. })
        ));
    }
}

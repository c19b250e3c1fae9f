//! The provider trait and its factory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{SlackConfig, SmsConfig, WhatsappConfig};
use crate::error::{ProviderError, Result};
use crate::sms::SmsClient;
use crate::slack::SlackClient;
use crate::types::{Channel, ConnectionInfo, MessageTemplate, OutboundMessage, ProviderKind, SendReceipt};
use crate::whatsapp::WhatsappClient;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A third-party messaging provider.
///
/// Abstracted so the workflow engine and API can be exercised without
/// network access.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Deliver a message. Messages for a different provider are rejected.
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt>;

    /// Verify the stored credentials against the provider.
    async fn test_connection(&self) -> Result<ConnectionInfo>;

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Err(ProviderError::Unsupported {
            provider: self.kind().as_str(),
            operation: "list_channels",
        })
    }

    async fn list_templates(&self) -> Result<Vec<MessageTemplate>> {
        Err(ProviderError::Unsupported {
            provider: self.kind().as_str(),
            operation: "list_templates",
        })
    }
}

/// Build a provider client from a decrypted credential config.
pub fn build_provider(kind: ProviderKind, config: &Value) -> Result<Box<dyn MessageProvider>> {
    let provider: Box<dyn MessageProvider> = match kind {
        ProviderKind::Slack => Box::new(SlackClient::new(SlackConfig::from_value(config)?)?),
        ProviderKind::Whatsapp => Box::new(WhatsappClient::new(WhatsappConfig::from_value(config)?)?),
        ProviderKind::Sms => Box::new(SmsClient::new(SmsConfig::from_value(config)?)?),
    };
    Ok(provider)
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(ProviderError::Http)
}

/// Decode a JSON body, turning non-2xx responses into [`ProviderError::Api`].
pub(crate) async fn read_json<T: DeserializeOwned>(provider: &'static str, resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Api {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn wrong_message(kind: ProviderKind, message: &OutboundMessage) -> ProviderError {
    ProviderError::Config(format!(
        "{kind} provider cannot deliver a {} message",
        message.kind()
    ))
}

//! Provider-neutral message and response types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Supported third-party messaging providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Slack,
    Whatsapp,
    Sms,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Slack => "slack",
            ProviderKind::Whatsapp => "whatsapp",
            ProviderKind::Sms => "sms",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(ProviderKind::Slack),
            "whatsapp" => Ok(ProviderKind::Whatsapp),
            "sms" => Ok(ProviderKind::Sms),
            other => Err(ProviderError::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// WhatsApp template message parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappTemplate {
    pub to: String,
    /// Overrides the configured sender number.
    #[serde(default)]
    pub from: Option<String>,
    pub template_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Ordered body placeholder values.
    #[serde(default)]
    pub body_params: Vec<String>,
    /// Dynamic suffix for a URL button.
    #[serde(default)]
    pub button_param: Option<String>,
}

/// A message ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    WhatsappTemplate(WhatsappTemplate),
    Sms {
        to: String,
        #[serde(default)]
        from: Option<String>,
        body: String,
    },
    Slack {
        /// Falls back to the configured default channel.
        #[serde(default)]
        channel: Option<String>,
        text: String,
    },
}

impl OutboundMessage {
    /// Provider able to deliver this message.
    pub fn kind(&self) -> ProviderKind {
        match self {
            OutboundMessage::WhatsappTemplate(_) => ProviderKind::Whatsapp,
            OutboundMessage::Sms { .. } => ProviderKind::Sms,
            OutboundMessage::Slack { .. } => ProviderKind::Slack,
        }
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub provider: ProviderKind,
    /// Provider-side identifier (Slack `ts`, Twilio SID, Freshchat request id).
    pub message_id: Option<String>,
    pub status: Option<String>,
}

/// Result of a connection test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub provider: ProviderKind,
    /// Human-readable account description.
    pub account: String,
}

/// Slack channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "is_private")]
    pub is_private: bool,
}

/// Approved WhatsApp message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub name: String,
    pub language: Option<String>,
    pub namespace: Option<String>,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [ProviderKind::Slack, ProviderKind::Whatsapp, ProviderKind::Sms] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("email".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_outbound_message_tagging() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "type": "sms",
            "to": "+15550001111",
            "body": "Hi"
        }))
        .unwrap();
        assert_eq!(message.kind(), ProviderKind::Sms);

        let message: OutboundMessage = serde_json::from_value(json!({
            "type": "whatsapp_template",
            "to": "+15550001111",
            "templateName": "welcome",
            "bodyParams": ["Ada"]
        }))
        .unwrap();
        match message {
            OutboundMessage::WhatsappTemplate(t) => {
                assert_eq!(t.template_name, "welcome");
                assert_eq!(t.body_params, vec!["Ada".to_string()]);
                assert!(t.button_param.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

//! Typed provider configurations, parsed from decrypted credential blobs.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ProviderError, Result};

pub const SLACK_API_URL: &str = "https://slack.com/api";
pub const TWILIO_API_URL: &str = "https://api.twilio.com";

fn default_slack_url() -> String {
    SLACK_API_URL.to_string()
}

fn default_twilio_url() -> String {
    TWILIO_API_URL.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Parse a credential blob, reporting missing fields as configuration errors.
pub fn parse_config<T: for<'de> Deserialize<'de>>(provider: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| ProviderError::Config(format!("{provider}: {e}")))
}

fn require(provider: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProviderError::Config(format!("{provider}: {field} is empty")));
    }
    Ok(())
}

/// Slack bot credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(alias = "bot_token")]
    pub bot_token: String,
    #[serde(default, alias = "default_channel")]
    pub default_channel: Option<String>,
    #[serde(default = "default_slack_url", alias = "base_url")]
    pub base_url: String,
}

impl SlackConfig {
    pub fn from_value(config: &Value) -> Result<Self> {
        let parsed: Self = parse_config("slack", config)?;
        require("slack", "botToken", &parsed.bot_token)?;
        Ok(parsed)
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }
}

/// Freshchat WhatsApp credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappConfig {
    /// Account API root, e.g. `https://acme.freshchat.com`.
    #[serde(alias = "api_url")]
    pub api_url: String,
    #[serde(alias = "api_key")]
    pub api_key: String,
    #[serde(default, alias = "from_phone")]
    pub from_phone: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl WhatsappConfig {
    pub fn from_value(config: &Value) -> Result<Self> {
        let parsed: Self = parse_config("whatsapp", config)?;
        require("whatsapp", "apiUrl", &parsed.api_url)?;
        require("whatsapp", "apiKey", &parsed.api_key)?;
        Ok(parsed)
    }

    pub fn outbound_url(&self) -> String {
        format!("{}/v2/outbound-messages/whatsapp", self.api_url.trim_end_matches('/'))
    }

    pub fn templates_url(&self) -> String {
        format!("{}/v2/whatsapp/templates", self.api_url.trim_end_matches('/'))
    }

    pub fn account_url(&self) -> String {
        format!("{}/v2/accounts/configuration", self.api_url.trim_end_matches('/'))
    }
}

/// Twilio SMS credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConfig {
    #[serde(alias = "account_sid")]
    pub account_sid: String,
    #[serde(alias = "auth_token")]
    pub auth_token: String,
    #[serde(default, alias = "from_phone")]
    pub from_phone: Option<String>,
    #[serde(default = "default_twilio_url", alias = "base_url")]
    pub base_url: String,
}

impl SmsConfig {
    pub fn from_value(config: &Value) -> Result<Self> {
        let parsed: Self = parse_config("sms", config)?;
        require("sms", "accountSid", &parsed.account_sid)?;
        require("sms", "authToken", &parsed.auth_token)?;
        Ok(parsed)
    }

    pub fn account_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}.json",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.account_sid)
        )
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.account_sid)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slack_defaults() {
        let config = SlackConfig::from_value(&json!({ "botToken": "xoxb-1" })).unwrap();
        assert_eq!(config.method_url("auth.test"), "https://slack.com/api/auth.test");
        assert!(config.default_channel.is_none());
    }

    #[test]
    fn test_snake_case_aliases() {
        let config = SmsConfig::from_value(&json!({
            "account_sid": "AC123",
            "auth_token": "secret",
            "from_phone": "+15550001111"
        }))
        .unwrap();
        assert_eq!(
            config.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        assert_eq!(config.from_phone.as_deref(), Some("+15550001111"));
    }

    #[test]
    fn test_whatsapp_urls() {
        let config = WhatsappConfig::from_value(&json!({
            "apiUrl": "https://acme.freshchat.com/",
            "apiKey": "key"
        }))
        .unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(
            config.outbound_url(),
            "https://acme.freshchat.com/v2/outbound-messages/whatsapp"
        );
    }

    #[test]
    fn test_missing_fields_are_config_errors() {
        assert!(matches!(
            SlackConfig::from_value(&json!({})),
            Err(ProviderError::Config(_))
        ));
        assert!(matches!(
            WhatsappConfig::from_value(&json!({ "apiUrl": "https://x", "apiKey": " " })),
            Err(ProviderError::Config(_))
        ));
    }
}

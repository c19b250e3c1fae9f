//! Freshchat WhatsApp Business client.
//!
//! Only template messages are sent; free-form WhatsApp messages require an
//! open customer session which this service never has.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WhatsappConfig;
use crate::error::{ProviderError, Result};
use crate::provider::{http_client, read_json, wrong_message, MessageProvider};
use crate::types::{
    ConnectionInfo, MessageTemplate, OutboundMessage, ProviderKind, SendReceipt, WhatsappTemplate,
};

const PROVIDER: &str = "whatsapp";

#[derive(Debug, Serialize, PartialEq)]
struct Phone<'a> {
    phone_number: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
struct Param<'a> {
    data: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
struct Language<'a> {
    policy: &'static str,
    code: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
struct BodyParams<'a> {
    params: Vec<Param<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ButtonParams<'a> {
    subtype: &'static str,
    params: Vec<Param<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct RichTemplateData<'a> {
    body: BodyParams<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    button: Option<ButtonParams<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct MessageTemplatePayload<'a> {
    storage: &'static str,
    template_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    language: Language<'a>,
    rich_template_data: RichTemplateData<'a>,
}

#[derive(Debug, Serialize, PartialEq)]
struct TemplateData<'a> {
    message_template: MessageTemplatePayload<'a>,
}

#[derive(Debug, Serialize, PartialEq)]
struct OutboundRequest<'a> {
    from: Phone<'a>,
    provider: &'static str,
    to: Vec<Phone<'a>>,
    data: TemplateData<'a>,
}

#[derive(Debug, Deserialize)]
struct OutboundResponse {
    request_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplatesResponse {
    #[serde(default)]
    templates: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    name: String,
    language: Option<String>,
    namespace: Option<String>,
    status: Option<String>,
}

/// Client for a Freshchat account with a WhatsApp channel.
#[derive(Clone)]
pub struct WhatsappClient {
    http: Client,
    config: WhatsappConfig,
}

impl std::fmt::Debug for WhatsappClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsappClient")
            .field("api_url", &self.config.api_url)
            .field("from_phone", &self.config.from_phone)
            .finish()
    }
}

impl WhatsappClient {
    pub fn new(config: WhatsappConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    fn build_request<'a>(&'a self, message: &'a WhatsappTemplate) -> Result<OutboundRequest<'a>> {
        let from = message
            .from
            .as_deref()
            .or(self.config.from_phone.as_deref())
            .ok_or_else(|| ProviderError::Config("whatsapp: no sender phone configured".to_string()))?;

        let body_params = message
            .body_params
            .iter()
            .map(|data| Param { data: data.as_str() })
            .collect();
        let button = message.button_param.as_deref().map(|data| ButtonParams {
            subtype: "url",
            params: vec![Param { data }],
        });

        Ok(OutboundRequest {
            from: Phone { phone_number: from },
            provider: "whatsapp",
            to: vec![Phone {
                phone_number: message.to.as_str(),
            }],
            data: TemplateData {
                message_template: MessageTemplatePayload {
                    storage: "none",
                    template_name: message.template_name.as_str(),
                    namespace: message.namespace.as_deref().or(self.config.namespace.as_deref()),
                    language: Language {
                        policy: "deterministic",
                        code: message.language.as_deref().unwrap_or(self.config.language.as_str()),
                    },
                    rich_template_data: RichTemplateData {
                        body: BodyParams { params: body_params },
                        button,
                    },
                },
            },
        })
    }

    /// Send an approved template message.
    pub async fn send_template(&self, message: &WhatsappTemplate) -> Result<SendReceipt> {
        let request = self.build_request(message)?;
        debug!(template = %message.template_name, "Sending WhatsApp template");

        let resp = self
            .http
            .post(self.config.outbound_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let body: OutboundResponse = read_json(PROVIDER, resp).await?;
        info!(request_id = ?body.request_id, "WhatsApp template accepted");

        Ok(SendReceipt {
            provider: ProviderKind::Whatsapp,
            message_id: body.request_id,
            status: Some(body.status.unwrap_or_else(|| "accepted".to_string())),
        })
    }
}

#[async_trait]
impl MessageProvider for WhatsappClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        match message {
            OutboundMessage::WhatsappTemplate(template) => self.send_template(template).await,
            other => Err(wrong_message(self.kind(), other)),
        }
    }

    async fn test_connection(&self) -> Result<ConnectionInfo> {
        let resp = self
            .http
            .get(self.config.account_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let _: serde_json::Value = read_json(PROVIDER, resp).await?;

        Ok(ConnectionInfo {
            provider: ProviderKind::Whatsapp,
            account: self.config.api_url.clone(),
        })
    }

    async fn list_templates(&self) -> Result<Vec<MessageTemplate>> {
        let resp = self
            .http
            .get(self.config.templates_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let body: TemplatesResponse = read_json(PROVIDER, resp).await?;

        Ok(body
            .templates
            .into_iter()
            .map(|t| MessageTemplate {
                name: t.name,
                language: t.language,
                namespace: t.namespace,
                status: t.status,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: String) -> WhatsappConfig {
        WhatsappConfig {
            api_url,
            api_key: "fc-key".to_string(),
            from_phone: Some("+15550000000".to_string()),
            namespace: Some("ns-1".to_string()),
            language: "en".to_string(),
        }
    }

    fn template() -> WhatsappTemplate {
        WhatsappTemplate {
            to: "+15551112222".to_string(),
            from: None,
            template_name: "promo_offer".to_string(),
            namespace: None,
            language: Some("es".to_string()),
            body_params: vec!["Ada".to_string(), "SAVE10".to_string()],
            button_param: Some("SAVE10".to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_template_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/outbound-messages/whatsapp"))
            .and(header("authorization", "Bearer fc-key"))
            .and(body_json(json!({
                "from": { "phone_number": "+15550000000" },
                "provider": "whatsapp",
                "to": [{ "phone_number": "+15551112222" }],
                "data": {
                    "message_template": {
                        "storage": "none",
                        "template_name": "promo_offer",
                        "namespace": "ns-1",
                        "language": { "policy": "deterministic", "code": "es" },
                        "rich_template_data": {
                            "body": { "params": [{ "data": "Ada" }, { "data": "SAVE10" }] },
                            "button": { "subtype": "url", "params": [{ "data": "SAVE10" }] }
                        }
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "request_id": "req-1" })))
            .mount(&server)
            .await;

        let client = WhatsappClient::new(config(server.uri())).unwrap();
        let receipt = client
            .send(&OutboundMessage::WhatsappTemplate(template()))
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("req-1"));
        assert_eq!(receipt.status.as_deref(), Some("accepted"));
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = WhatsappClient::new(config(server.uri())).unwrap();
        match client.send_template(&template()).await.unwrap_err() {
            ProviderError::Api { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_sms_message() {
        let client = WhatsappClient::new(config("http://127.0.0.1:9".to_string())).unwrap();
        let err = client
            .send(&OutboundMessage::Sms {
                to: "+1".to_string(),
                from: None,
                body: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn test_list_templates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/whatsapp/templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "templates": [{ "name": "promo_offer", "language": "en", "status": "APPROVED" }]
            })))
            .mount(&server)
            .await;

        let client = WhatsappClient::new(config(server.uri())).unwrap();
        let templates = client.list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].status.as_deref(), Some("APPROVED"));
    }
}

//! Outbound messaging providers.
//!
//! Each provider is a thin REST client built from a decrypted credential
//! config and exposed through [`MessageProvider`]. Browser push goes through
//! [`PushSender`].
//!
//! | Provider | Client | API |
//! |----------|--------|-----|
//! | `slack` | [`SlackClient`] | Slack Web API (`chat.postMessage`, `auth.test`, `conversations.list`) |
//! | `whatsapp` | [`WhatsappClient`] | Freshchat outbound WhatsApp template messages |
//! | `sms` | [`SmsClient`] | Twilio Messages API |
//!
//! # Example
//!
//! ```rust,ignore
//! use providers::{build_provider, OutboundMessage, ProviderKind};
//!
//! let provider = build_provider(ProviderKind::Slack, &config)?;
//! provider
//!     .send(&OutboundMessage::Slack { channel: None, text: "Deploy done".into() })
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod push;
pub mod slack;
pub mod sms;
pub mod types;
pub mod whatsapp;

pub use config::{SlackConfig, SmsConfig, WhatsappConfig};
pub use error::{ProviderError, Result};
pub use provider::{build_provider, MessageProvider};
pub use push::{
    send_all, GatewayPushSender, LoggingPushSender, PushKeys, PushMessage, PushReport, PushSender,
    PushTarget,
};
pub use slack::SlackClient;
pub use sms::SmsClient;
pub use types::{
    Channel, ConnectionInfo, MessageTemplate, OutboundMessage, ProviderKind, SendReceipt,
    WhatsappTemplate,
};
pub use whatsapp::WhatsappClient;

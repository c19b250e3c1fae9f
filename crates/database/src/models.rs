//! Database models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// A tracked analytics event. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Event name (e.g., "page_view").
    pub name: String,
    /// Event category (e.g., "engagement", "conversion").
    pub category: String,
    /// Free-form event properties.
    pub properties: Json<Value>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub timestamp: String,
    pub path: Option<String>,
    pub action: Option<String>,
    pub value: Option<f64>,
    pub item_name: Option<String>,
    pub item_id: Option<String>,
    pub item_category: Option<String>,
}

/// Payload for tracking a new event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEvent {
    pub name: String,
    pub category: String,
    pub properties: Value,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    /// Client timestamp; the insert time is used when absent.
    pub timestamp: Option<String>,
    pub path: Option<String>,
    pub action: Option<String>,
    pub value: Option<f64>,
    pub item_name: Option<String>,
    pub item_id: Option<String>,
    pub item_category: Option<String>,
}

/// A stored workflow definition.
///
/// `trigger` and `actions` hold the JSON exactly as saved by the builder;
/// the workflow engine parses them into typed definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[sqlx(rename = "trigger_def")]
    pub trigger: Json<Value>,
    pub actions: Json<Value>,
    pub is_active: bool,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields written when a workflow is created or fully replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    pub name: String,
    pub trigger: Value,
    pub actions: Value,
    pub is_active: bool,
}

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One run of a workflow against a triggering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub event_id: Option<String>,
    /// One of `running`, `completed`, `failed`.
    pub status: String,
    pub results: Option<Json<Value>>,
    pub error: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl WorkflowExecution {
    /// Parsed status; unknown values are treated as failed.
    pub fn status(&self) -> ExecutionStatus {
        self.status.parse().unwrap_or(ExecutionStatus::Failed)
    }
}

/// Outcome of one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Audit record for a single action inside an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionStep {
    pub id: i64,
    pub execution_id: String,
    pub step_order: i64,
    pub action_type: String,
    /// `completed` or `failed`.
    pub status: String,
    pub output: Option<Json<Value>>,
    pub error: Option<String>,
    pub created_at: String,
}

/// Discount parameters shared by a group of pre-generated codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeBatch {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// `percentage` or `fixed`.
    pub discount_type: String,
    pub discount_value: f64,
    pub prefix: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub is_active: bool,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub created_at: String,
}

/// A single pre-generated promo code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub id: i64,
    pub batch_id: String,
    pub code: String,
    pub is_used: bool,
    pub used_at: Option<String>,
    pub used_by: Option<String>,
    pub created_at: String,
}

/// Third-party provider credential. `config` is ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationCredential {
    pub id: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    /// Provider slug (`slack`, `whatsapp`, `sms`).
    pub provider: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub config: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A named, SQL-defined snapshot of a user set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSegment {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub query: String,
    pub criteria: Json<Value>,
    /// Row count captured when the segment was created or last refreshed.
    pub user_count: i64,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Browser push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: String,
}

/// Outbound push campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub segment_id: Option<String>,
    /// `draft` or `sent`.
    pub status: String,
    pub sent_count: i64,
    pub click_count: i64,
    pub close_count: i64,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable campaign fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignInput {
    pub name: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub segment_id: Option<String>,
}

/// Registered outbound webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub url: String,
    /// Event names the webhook subscribes to.
    pub events: Json<Value>,
    pub secret: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Owner of a record: the acting user and, optionally, their organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub user_id: String,
    pub organization_id: Option<String>,
}

impl Owner {
    pub fn new(user_id: impl Into<String>, organization_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id,
        }
    }
}

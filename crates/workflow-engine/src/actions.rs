//! Workflow definitions and action configuration types.

use database::Workflow;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Operator;
use crate::database_action::DatabaseOperation;
use crate::error::{EngineError, Result};
use crate::transform::{Reducer, SortOrder, Transform, TransformOperation};
use crate::trigger::Trigger;

/// Largest delay that can be recorded, one year in milliseconds.
pub const MAX_DELAY_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// A validated workflow: trigger plus ordered actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub trigger: Trigger,
    pub actions: Vec<ActionConfig>,
}

impl WorkflowDefinition {
    /// Parse and validate builder JSON.
    pub fn parse(trigger: &Value, actions: &Value) -> Result<Self> {
        let trigger = parse_trigger(trigger)?;

        let raw_actions = actions
            .as_array()
            .ok_or_else(|| EngineError::InvalidDefinition("actions must be an array".to_string()))?;

        let actions = raw_actions
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let action_type = raw.get("type").and_then(Value::as_str).unwrap_or("<missing>");
                let invalid = |reason: String| {
                    EngineError::InvalidDefinition(format!("action {} ({action_type}): {reason}", index + 1))
                };
                let action: ActionConfig =
                    serde_json::from_value(raw.clone()).map_err(|e| invalid(e.to_string()))?;
                action.validate().map_err(invalid)?;
                Ok(action)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { trigger, actions })
    }

    pub fn from_workflow(workflow: &Workflow) -> Result<Self> {
        Self::parse(&workflow.trigger.0, &workflow.actions.0)
    }
}

/// Parse a trigger on its own; matching does not need valid actions.
pub fn parse_trigger(value: &Value) -> Result<Trigger> {
    let trigger: Trigger = serde_json::from_value(value.clone())
        .map_err(|e| EngineError::InvalidDefinition(format!("trigger: {e}")))?;
    if trigger.event_type.trim().is_empty() {
        return Err(EngineError::InvalidDefinition(
            "trigger: eventType is required".to_string(),
        ));
    }
    Ok(trigger)
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    PushNotification(PushNotificationAction),
    WhatsappMessage(WhatsappMessageAction),
    SmsMessage(SmsMessageAction),
    SlackMessage(SlackMessageAction),
    PromoCode(PromoCodeAction),
    Delay(DelayAction),
    Database(DatabaseAction),
    Transform(TransformAction),
    Condition(ConditionAction),
}

impl ActionConfig {
    /// The `type` tag, as recorded on execution steps.
    pub fn action_type(&self) -> &'static str {
        match self {
            ActionConfig::PushNotification(_) => "push_notification",
            ActionConfig::WhatsappMessage(_) => "whatsapp_message",
            ActionConfig::SmsMessage(_) => "sms_message",
            ActionConfig::SlackMessage(_) => "slack_message",
            ActionConfig::PromoCode(_) => "promo_code",
            ActionConfig::Delay(_) => "delay",
            ActionConfig::Database(_) => "database",
            ActionConfig::Transform(_) => "transform",
            ActionConfig::Condition(_) => "condition",
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ActionConfig::PushNotification(a) => {
                required("title", &a.title)?;
                required("body", &a.body)?;
                if a.target_users == TargetUsers::Specific && a.user_ids.is_empty() {
                    return Err("userIds is required when targetUsers is specific".to_string());
                }
                Ok(())
            }
            ActionConfig::WhatsappMessage(a) => {
                required("templateName", &a.template_name)?;
                required("toPhone", &a.to_phone)
            }
            ActionConfig::SmsMessage(a) => {
                required("toPhone", &a.to_phone)?;
                required("message", &a.message)
            }
            ActionConfig::SlackMessage(a) => required("message", &a.message),
            ActionConfig::PromoCode(a) => {
                required("batchId", &a.batch_id)?;
                required("outputVariable", &a.output_variable)?;
                if a.code_type == CodeType::Specific && a.code.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err("code is required when codeType is specific".to_string());
                }
                Ok(())
            }
            ActionConfig::Delay(a) => {
                if a.delay_ms() > MAX_DELAY_MS {
                    return Err("delay exceeds one year".to_string());
                }
                Ok(())
            }
            ActionConfig::Database(a) => a.validate(),
            ActionConfig::Transform(a) => a.to_transform().map(|_| ()),
            ActionConfig::Condition(_) => Ok(()),
        }
    }
}

fn required(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

fn default_output_variable() -> String {
    "promoCode".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetUsers {
    /// Every subscription of the workflow's organization.
    #[default]
    All,
    /// Only subscriptions belonging to `userIds`.
    Specific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationAction {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub target_users: TargetUsers,
    /// User ids; placeholders such as `{event.userId}` are allowed.
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappMessageAction {
    pub template_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub from_phone: Option<String>,
    pub to_phone: String,
    #[serde(default)]
    pub body_variable1: Option<String>,
    #[serde(default)]
    pub body_variable2: Option<String>,
    #[serde(default)]
    pub body_variable3: Option<String>,
    #[serde(default)]
    pub button_variable: Option<String>,
}

impl WhatsappMessageAction {
    /// Body variables by placeholder position, up to the last one set.
    ///
    /// Unset slots before it are sent as empty strings so later values keep
    /// their position in the template.
    pub fn body_variables(&self) -> impl Iterator<Item = &str> {
        let slots = [&self.body_variable1, &self.body_variable2, &self.body_variable3];
        let used = slots.iter().rposition(|v| v.is_some()).map_or(0, |last| last + 1);
        slots.into_iter().take(used).map(|v| v.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessageAction {
    pub to_phone: String,
    #[serde(default)]
    pub from_phone: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackMessageAction {
    #[serde(default)]
    pub channel: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    #[default]
    Random,
    Sequential,
    Specific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeAction {
    pub batch_id: String,
    #[serde(default)]
    pub code_type: CodeType,
    /// Required for `specific`.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_output_variable")]
    pub output_variable: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayAction {
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub unit: DelayUnit,
}

impl DelayAction {
    pub fn delay_ms(&self) -> u64 {
        let factor = match self.unit {
            DelayUnit::Seconds => 1_000,
            DelayUnit::Minutes => 60_000,
            DelayUnit::Hours => 3_600_000,
            DelayUnit::Days => 86_400_000,
        };
        self.duration.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAction {
    pub operation: DatabaseOperation,
    pub table: String,
    /// Column equality filters; values may contain placeholders.
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Row to insert for `create`.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub output_variable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformAction {
    /// Array or a placeholder resolving to one, e.g. `{workflow.orders}`.
    pub input: Value,
    pub operation: TransformOperation,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub reducer: Option<Reducer>,
    #[serde(default)]
    pub order: SortOrder,
    pub output_variable: String,
}

impl TransformAction {
    /// Check that the fields required by `operation` are present.
    pub fn to_transform(&self) -> std::result::Result<Transform, String> {
        required("outputVariable", &self.output_variable)?;
        let field = self.field.clone().filter(|f| !f.trim().is_empty());

        match self.operation {
            TransformOperation::Map => Ok(Transform::Map {
                field: field.ok_or("map requires field")?,
            }),
            TransformOperation::Filter => Ok(Transform::Filter {
                field,
                operator: self.operator.ok_or("filter requires operator")?,
                value: self.value.clone().unwrap_or(Value::Null),
            }),
            TransformOperation::Reduce => Ok(Transform::Reduce {
                reducer: self.reducer.ok_or("reduce requires reducer")?,
                field,
            }),
            TransformOperation::Sort => Ok(Transform::Sort {
                field,
                order: self.order,
            }),
        }
    }
}

/// Halts the workflow (successfully) when the comparison is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionAction {
    #[serde(alias = "left")]
    pub field: Value,
    pub operator: Operator,
    #[serde(default, alias = "right")]
    pub value: Value,
}

//! Workflow execution.
//!
//! Each matching workflow runs its actions in order inside the caller's
//! request. Every action produces one step record. The first failing action
//! marks the execution `failed` and stops it; earlier side effects stay. A
//! false `condition` stops the execution as `completed`.

use std::sync::Arc;

use async_trait::async_trait;
use credential_vault::CredentialVault;
use database::{execution, promo_code, push_subscription, workflow as workflow_store};
use database::{ClaimStrategy, DatabaseError, Event, ExecutionStatus, StepStatus, Workflow};
use providers::{
    build_provider, send_all, MessageProvider, OutboundMessage, ProviderKind, PushMessage, PushSender,
    PushTarget, WhatsappTemplate,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::actions::{
    ActionConfig, CodeType, ConditionAction, DatabaseAction, PromoCodeAction, PushNotificationAction,
    TargetUsers, TransformAction, WhatsappMessageAction, WorkflowDefinition,
};
use crate::condition::evaluate;
use crate::database_action;
use crate::error::{EngineError, Result};
use crate::template::VariableContext;

/// Looks up a messaging provider for an organization.
///
/// Abstracted so executions can be tested without stored credentials.
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve(&self, organization_id: &str, kind: ProviderKind) -> Result<Box<dyn MessageProvider>>;
}

/// Resolves providers from the organization's active encrypted credential.
#[derive(Clone)]
pub struct VaultProviderResolver {
    vault: CredentialVault,
}

impl VaultProviderResolver {
    pub fn new(vault: CredentialVault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl ProviderResolver for VaultProviderResolver {
    async fn resolve(&self, organization_id: &str, kind: ProviderKind) -> Result<Box<dyn MessageProvider>> {
        let (credential, config) = self.vault.load_active(organization_id, kind.as_str()).await?;
        debug!(credential_id = %credential.id, provider = %kind, "Building provider");
        Ok(build_provider(kind, &config)?)
    }
}

/// Outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    /// Number of step records written.
    pub steps: usize,
    /// True when a condition stopped the run early.
    pub halted: bool,
    pub error: Option<String>,
}

enum StepOutcome {
    Continue(Value),
    Halt(Value),
}

/// The workflow being executed and the event that triggered it.
struct Run<'a> {
    workflow: &'a Workflow,
    event: &'a Event,
}

impl Run<'_> {
    fn organization_id(&self) -> Option<&str> {
        self.workflow.organization_id.as_deref()
    }

    /// Whether a record owned by `user_id` / `organization_id` belongs to
    /// the workflow's owner.
    fn owns(&self, user_id: &str, organization_id: Option<&str>) -> bool {
        match self.organization_id() {
            Some(org) => organization_id == Some(org),
            None => organization_id.is_none() && user_id == self.workflow.user_id,
        }
    }
}

/// Runs workflows against tracked events.
#[derive(Clone)]
pub struct WorkflowEngine {
    pool: SqlitePool,
    providers: Arc<dyn ProviderResolver>,
    push: Arc<dyn PushSender>,
}

impl WorkflowEngine {
    pub fn new(pool: SqlitePool, providers: Arc<dyn ProviderResolver>, push: Arc<dyn PushSender>) -> Self {
        Self { pool, providers, push }
    }

    /// Run every active workflow whose trigger matches `event`.
    ///
    /// Only workflows of the event's organization are considered. Events
    /// without one only reach workflows that have none either.
    ///
    /// One workflow failing does not keep the others from running.
    pub async fn handle_event(&self, event: &Event) -> Result<Vec<ExecutionSummary>> {
        let workflows = workflow_store::list_active_workflows(&self.pool).await?;
        let mut summaries = Vec::new();

        for workflow in workflows.iter().filter(|w| self.should_run(w, event)) {
            match self.execute(workflow, event).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(workflow_id = %workflow.id, error = %e, "Workflow execution could not be recorded");
                }
            }
        }

        debug!(event_id = %event.id, executions = summaries.len(), "Event handled");
        Ok(summaries)
    }

    fn should_run(&self, workflow: &Workflow, event: &Event) -> bool {
        if event.organization_id != workflow.organization_id {
            return false;
        }

        match crate::actions::parse_trigger(&workflow.trigger.0) {
            Ok(trigger) => trigger.matches(event),
            Err(e) => {
                warn!(workflow_id = %workflow.id, error = %e, "Skipping workflow with invalid trigger");
                false
            }
        }
    }

    /// Execute one workflow for `event`, regardless of its trigger.
    ///
    /// Action failures are reported in the summary. `Err` means the audit
    /// trail itself could not be written.
    pub async fn execute(&self, workflow: &Workflow, event: &Event) -> Result<ExecutionSummary> {
        let record = execution::start_execution(&self.pool, &workflow.id, Some(&event.id)).await?;
        info!(workflow_id = %workflow.id, execution_id = %record.id, event = %event.name, "Workflow started");

        let mut summary = ExecutionSummary {
            execution_id: record.id.clone(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status: ExecutionStatus::Running,
            steps: 0,
            halted: false,
            error: None,
        };

        let definition = match WorkflowDefinition::from_workflow(workflow) {
            Ok(definition) => definition,
            Err(e) => {
                let message = e.to_string();
                execution::fail_execution(&self.pool, &record.id, &json!({}), &message).await?;
                warn!(workflow_id = %workflow.id, error = %message, "Workflow definition invalid");
                summary.status = ExecutionStatus::Failed;
                summary.error = Some(message);
                return Ok(summary);
            }
        };

        let run = Run { workflow, event };
        let mut ctx = VariableContext::new(serde_json::to_value(event)?);

        for (index, action) in definition.actions.iter().enumerate() {
            let step_order = index as i64 + 1;
            let action_type = action.action_type();

            match self.run_action(&run, action, &mut ctx).await {
                Ok(outcome) => {
                    let (output, halt) = match outcome {
                        StepOutcome::Continue(output) => (output, false),
                        StepOutcome::Halt(output) => (output, true),
                    };
                    execution::record_step(
                        &self.pool,
                        &record.id,
                        step_order,
                        action_type,
                        StepStatus::Completed,
                        Some(&output),
                        None,
                    )
                    .await?;
                    summary.steps += 1;

                    if halt {
                        info!(execution_id = %record.id, step_order, "Condition false, stopping workflow");
                        summary.halted = true;
                        break;
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    execution::record_step(
                        &self.pool,
                        &record.id,
                        step_order,
                        action_type,
                        StepStatus::Failed,
                        None,
                        Some(&message),
                    )
                    .await?;
                    summary.steps += 1;

                    let results = Value::Object(ctx.workflow().clone());
                    execution::fail_execution(&self.pool, &record.id, &results, &message).await?;
                    warn!(execution_id = %record.id, action_type, error = %message, "Workflow failed");

                    summary.status = ExecutionStatus::Failed;
                    summary.error = Some(message);
                    return Ok(summary);
                }
            }
        }

        let results = Value::Object(ctx.into_workflow());
        execution::complete_execution(&self.pool, &record.id, &results).await?;
        info!(execution_id = %record.id, steps = summary.steps, "Workflow completed");

        summary.status = ExecutionStatus::Completed;
        Ok(summary)
    }

    async fn run_action(&self, run: &Run<'_>, action: &ActionConfig, ctx: &mut VariableContext) -> Result<StepOutcome> {
        let output = match action {
            ActionConfig::PushNotification(push) => self.push_notification(run, push, ctx).await?,
            ActionConfig::WhatsappMessage(wa) => {
                let message = OutboundMessage::WhatsappTemplate(whatsapp_template(wa, ctx));
                self.send_message(run, "whatsapp_message", &message).await?
            }
            ActionConfig::SmsMessage(sms) => {
                let message = OutboundMessage::Sms {
                    to: ctx.render(&sms.to_phone),
                    from: sms.from_phone.as_deref().map(|f| ctx.render(f)),
                    body: ctx.render(&sms.message),
                };
                self.send_message(run, "sms_message", &message).await?
            }
            ActionConfig::SlackMessage(slack) => {
                let message = OutboundMessage::Slack {
                    channel: slack.channel.as_deref().map(|c| ctx.render(c)),
                    text: ctx.render(&slack.message),
                };
                self.send_message(run, "slack_message", &message).await?
            }
            ActionConfig::PromoCode(promo) => self.claim_promo_code(run, promo, ctx).await?,
            ActionConfig::Delay(delay) => {
                // Delays are recorded, never waited on.
                json!({ "delayMs": delay.delay_ms(), "scheduled": false })
            }
            ActionConfig::Database(db) => self.database(run, db, ctx).await?,
            ActionConfig::Transform(transform) => run_transform(transform, ctx)?,
            ActionConfig::Condition(condition) => {
                let (output, passed) = check_condition(condition, ctx);
                if !passed {
                    return Ok(StepOutcome::Halt(output));
                }
                output
            }
        };

        Ok(StepOutcome::Continue(output))
    }

    async fn push_notification(
        &self,
        run: &Run<'_>,
        push: &PushNotificationAction,
        ctx: &VariableContext,
    ) -> Result<Value> {
        let subscriptions = match push.target_users {
            TargetUsers::All => match run.organization_id() {
                Some(org) => push_subscription::list_subscriptions(&self.pool, org).await?,
                None => {
                    push_subscription::list_subscriptions_for_users(
                        &self.pool,
                        std::slice::from_ref(&run.workflow.user_id),
                    )
                    .await?
                }
            },
            TargetUsers::Specific => {
                let user_ids: Vec<String> = push
                    .user_ids
                    .iter()
                    .map(|u| ctx.render(u))
                    .filter(|u| !u.trim().is_empty())
                    .collect();
                push_subscription::list_subscriptions_for_users(&self.pool, &user_ids).await?
            }
        };

        let targets: Vec<PushTarget> = subscriptions
            .into_iter()
            .map(|s| PushTarget::new(s.endpoint, s.p256dh, s.auth))
            .collect();

        let mut message = PushMessage::new(ctx.render(&push.title), ctx.render(&push.body));
        message.url = push.url.as_deref().map(|u| ctx.render(u));
        message.icon = push.icon.as_deref().map(|i| ctx.render(i));
        message.data = Some(json!({ "workflowId": run.workflow.id }));

        let report = send_all(self.push.as_ref(), &targets, &message).await;
        push_subscription::prune_endpoints(&self.pool, &report.expired).await?;

        Ok(json!({
            "title": message.title,
            "body": message.body,
            "targets": targets.len(),
            "sent": report.sent,
            "failed": report.failed,
        }))
    }

    async fn send_message(&self, run: &Run<'_>, action: &'static str, message: &OutboundMessage) -> Result<Value> {
        let organization_id = run
            .organization_id()
            .ok_or(EngineError::MissingOrganization { action })?;

        let provider = self.providers.resolve(organization_id, message.kind()).await?;
        let receipt = provider.send(message).await?;
        info!(provider = %receipt.provider, message_id = ?receipt.message_id, "Message sent");

        Ok(serde_json::to_value(receipt)?)
    }

    async fn claim_promo_code(
        &self,
        run: &Run<'_>,
        promo: &PromoCodeAction,
        ctx: &mut VariableContext,
    ) -> Result<Value> {
        let batch_id = ctx.render(&promo.batch_id);
        let strategy = match promo.code_type {
            CodeType::Random => ClaimStrategy::Random,
            CodeType::Sequential => ClaimStrategy::Sequential,
            CodeType::Specific => ClaimStrategy::Specific(ctx.render(promo.code.as_deref().unwrap_or_default())),
        };

        let batch = promo_code::get_batch(&self.pool, &batch_id).await?;
        if !run.owns(&batch.user_id, batch.organization_id.as_deref()) {
            return Err(DatabaseError::NotFound {
                entity: "PromoCodeBatch",
                id: batch_id,
            }
            .into());
        }

        let claimed = promo_code::claim_code(&self.pool, &batch_id, &strategy, run.event.user_id.as_deref()).await?;
        let var = &promo.output_variable;
        ctx.set(var.clone(), Value::String(claimed.code.code.clone()));
        ctx.set(format!("{var}_discountValue"), json!(claimed.batch.discount_value));
        ctx.set(format!("{var}_discountType"), json!(claimed.batch.discount_type));
        if let Some(valid_until) = &claimed.batch.valid_until {
            ctx.set(format!("{var}_validUntil"), json!(valid_until));
        }

        Ok(json!({
            "code": claimed.code.code,
            "batchId": claimed.batch.id,
            "discountType": claimed.batch.discount_type,
            "discountValue": claimed.batch.discount_value,
        }))
    }

    async fn database(&self, run: &Run<'_>, action: &DatabaseAction, ctx: &mut VariableContext) -> Result<Value> {
        let filters = resolve_map(&action.filters, ctx);
        let data = resolve_map(&action.data, ctx);
        let result = database_action::run(&self.pool, action, &filters, &data, run.organization_id()).await?;

        if let Some(var) = action.output_variable.as_deref().filter(|v| !v.is_empty()) {
            ctx.set(var, result.clone());
        }
        Ok(result)
    }
}

fn whatsapp_template(action: &WhatsappMessageAction, ctx: &VariableContext) -> WhatsappTemplate {
    WhatsappTemplate {
        to: ctx.render(&action.to_phone),
        from: action.from_phone.as_deref().map(|f| ctx.render(f)),
        template_name: ctx.render(&action.template_name),
        namespace: action.namespace.clone(),
        language: action.language.clone(),
        body_params: action.body_variables().map(|v| ctx.render(v)).collect(),
        button_param: action.button_variable.as_deref().map(|b| ctx.render(b)),
    }
}

fn run_transform(action: &TransformAction, ctx: &mut VariableContext) -> Result<Value> {
    let transform = action.to_transform().map_err(EngineError::InvalidDefinition)?;
    let input = ctx.resolve_json(&action.input);
    let output = transform.apply(&input)?;
    ctx.set(action.output_variable.clone(), output.clone());
    Ok(output)
}

fn check_condition(action: &ConditionAction, ctx: &VariableContext) -> (Value, bool) {
    let left = ctx.resolve_json(&action.field);
    let right = ctx.resolve_json(&action.value);
    let passed = evaluate(&left, action.operator, &right);
    (
        json!({ "left": left, "operator": action.operator, "right": right, "passed": passed }),
        passed,
    )
}

fn resolve_map(map: &Map<String, Value>, ctx: &VariableContext) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), ctx.resolve_json(v)))
        .collect()
}

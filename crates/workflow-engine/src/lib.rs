//! Event-triggered workflow execution.
//!
//! A workflow is a trigger plus an ordered list of actions. When an event is
//! tracked, [`WorkflowEngine::handle_event`] runs every active workflow whose
//! trigger matches it.
//!
//! # Architecture
//!
//! ```text
//! Tracked event (POST /api/events)
//!          ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WORKFLOW ENGINE                          │
//! │                                                              │
//! │  1. Load active workflows, match triggers                    │
//! │         ↓                                                    │
//! │  2. Open a `running` execution                               │
//! │         ↓                                                    │
//! │  3. For each action, in order:                               │
//! │     • render {event.x} / {workflow.y} placeholders           │
//! │     • dispatch (push, WhatsApp, SMS, Slack, promo code,      │
//! │       delay, database, transform, condition)                 │
//! │     • record a step                                          │
//! │         ↓                                                    │
//! │  4. `completed` (all done or condition false)                │
//! │     `failed` (first error, no rollback)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use workflow_engine::{VaultProviderResolver, WorkflowEngine};
//! use providers::LoggingPushSender;
//!
//! let engine = WorkflowEngine::new(
//!     db.pool().clone(),
//!     Arc::new(VaultProviderResolver::new(vault)),
//!     Arc::new(LoggingPushSender),
//! );
//! let summaries = engine.handle_event(&event).await?;
//! ```

pub mod actions;
pub mod condition;
pub mod database_action;
pub mod engine;
pub mod error;
pub mod template;
pub mod transform;
pub mod trigger;

pub use actions::{ActionConfig, WorkflowDefinition};
pub use condition::{evaluate, Operator};
pub use engine::{ExecutionSummary, ProviderResolver, VaultProviderResolver, WorkflowEngine};
pub use error::{EngineError, Result};
pub use template::{Placeholder, Scope, Segment, Template, UnresolvedPath, VariableContext};
pub use transform::Transform;
pub use trigger::{Trigger, TriggerFilters};

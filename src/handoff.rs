//! # Agent Handoffs
//!
//! A handoff lets one agent transfer control of the conversation to another,
//! more specialized agent. To the model it looks like a tool; to the runner it
//! is a small state machine:
//!
//! ```text
//! Registered -> Offered -> Selected -> Validated -> EnabledChecked
//!            -> CallbackRun -> Filtered -> Delegated
//! ```
//!
//! Any step before `CallbackRun` may end in `Rejected` instead, which only
//! affects the current turn. The [`Handoff`] descriptor carries the pieces each
//! step needs: the enablement policy (`Offered`, `EnabledChecked`), the input
//! schema (`Validated`), the observer (`CallbackRun`) and the history filter
//! (`Filtered`).
//!
//! ```rust
//! use advanced_handoff::{AgentDefinition, Handoff};
//! use advanced_handoff::filters::remove_all_tools;
//! use advanced_handoff::policy::adults_only;
//! use std::sync::Arc;
//!
//! let tutor = AgentDefinition::builder("Math Teacher")
//!     .instructions("You are a helpful math teacher agent.")
//!     .build()
//!     .unwrap();
//!
//! let handoff = Handoff::new(tutor)
//!     .with_tool_name("special_math_teacher")
//!     .with_input_filter(Arc::new(remove_all_tools))
//!     .with_is_enabled(adults_only());
//!
//! assert_eq!(handoff.tool_name, "special_math_teacher");
//! assert_eq!(handoff.agent().name(), "Math Teacher");
//! ```

use std::fmt;
use std::sync::Arc;

use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionTool};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentDefinition;
use crate::context::RunContext;
use crate::error::{AgentsError, Result};
use crate::filters::HistoryFilter;
use crate::policy::EnablementPolicy;
use crate::tool::function_tool;

/// System context prepended to the instructions of agents that take part in handoffs.
pub const RECOMMENDED_PROMPT_PREFIX: &str = "# System context\n\
You are part of a multi-agent system designed to make agent coordination and execution easy. \
Agents uses two primary abstractions: **Agents** and **Handoffs**. An agent encompasses \
instructions and tools and can hand off a conversation to another agent when appropriate. \
Handoffs are achieved by calling a handoff function, generally named `transfer_to_<agent_name>`. \
Transfers between agents are handled seamlessly in the background; do not mention or draw \
attention to these transfers in your conversation with the user.\n";

/// Prefixes `instructions` with [`RECOMMENDED_PROMPT_PREFIX`].
pub fn prompt_with_handoff_instructions(instructions: &str) -> String {
    format!("{}\n{}", RECOMMENDED_PROMPT_PREFIX, instructions)
}

/// Payload the model must supply when it selects a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HandoffInput {
    /// Why the conversation is being handed off.
    pub reason: String,
}

/// Stages of a handoff within one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStage {
    Registered,
    Offered,
    Selected,
    Validated,
    EnabledChecked,
    CallbackRun,
    Filtered,
    Delegated,
    Rejected,
}

impl fmt::Display for HandoffStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandoffStage::Registered => "registered",
            HandoffStage::Offered => "offered",
            HandoffStage::Selected => "selected",
            HandoffStage::Validated => "validated",
            HandoffStage::EnabledChecked => "enabled_checked",
            HandoffStage::CallbackRun => "callback_run",
            HandoffStage::Filtered => "filtered",
            HandoffStage::Delegated => "delegated",
            HandoffStage::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Emitted once per successful handoff selection, before control transfers.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffEvent {
    pub run_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub tool_name: String,
    pub input: HandoffInput,
    pub context: RunContext,
    pub at: DateTime<Utc>,
}

/// Consumer of [`HandoffEvent`]s.
///
/// Failures are logged by the runner and never block a handoff that already
/// passed its enablement check.
#[async_trait]
pub trait HandoffObserver: Send + Sync {
    async fn on_handoff(&self, event: &HandoffEvent) -> Result<()>;
}

/// Records the context and reason of every handoff through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

#[async_trait]
impl HandoffObserver for LoggingObserver {
    async fn on_handoff(&self, event: &HandoffEvent) -> Result<()> {
        info!(
            run_id = %event.run_id,
            from = %event.from_agent,
            to = %event.to_agent,
            context = %event.context.to_value(),
            reason = %event.input.reason,
            "handoff selected"
        );
        Ok(())
    }
}

/// Function-backed observer.
#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub struct ObserverFn(pub Arc<dyn Fn(&HandoffEvent) -> Result<()> + Send + Sync + 'static>);

#[async_trait]
impl HandoffObserver for ObserverFn {
    async fn on_handoff(&self, event: &HandoffEvent) -> Result<()> {
        (self.0)(event)
    }
}

pub fn observer_fn<F>(f: F) -> ObserverFn
where
    F: Fn(&HandoffEvent) -> Result<()> + Send + Sync + 'static,
{
    ObserverFn(Arc::new(f))
}

/// A handoff the runner refused, with the stage at which it stopped.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffRejection {
    pub tool_name: String,
    pub stage: HandoffStage,
    pub error: String,
}

/// A completed transfer of control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffRecord {
    pub from_agent: String,
    pub to_agent: String,
    pub tool_name: String,
    pub reason: String,
}

/// Descriptor binding a target agent to the tool the model sees and the hooks
/// the runner applies when that tool is chosen.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct Handoff {
    /// Name of the tool exposed to the model.
    pub tool_name: String,

    /// Description of the tool exposed to the model.
    pub tool_description: String,

    /// JSON schema of [`HandoffInput`].
    pub input_schema: Value,

    agent: Arc<AgentDefinition>,
    on_handoff: Option<Arc<dyn HandoffObserver>>,
    input_filter: Option<HistoryFilter>,
    is_enabled: Option<Arc<dyn EnablementPolicy>>,
}

impl Handoff {
    /// Creates a handoff to `agent` with the default tool name and description.
    pub fn new(agent: AgentDefinition) -> Self {
        Self::from_shared(Arc::new(agent))
    }

    /// Creates a handoff to an agent that is already shared elsewhere.
    pub fn from_shared(agent: Arc<AgentDefinition>) -> Self {
        let tool_name = default_tool_name(agent.name());
        let tool_description = default_tool_description(&agent);
        Self {
            tool_name,
            tool_description,
            input_schema: input_schema(),
            agent,
            on_handoff: None,
            input_filter: None,
            is_enabled: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = description.into();
        self
    }

    pub fn with_on_handoff<O>(mut self, observer: O) -> Self
    where
        O: HandoffObserver + 'static,
    {
        self.on_handoff = Some(Arc::new(observer));
        self
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn HandoffObserver>) -> Self {
        self.on_handoff = Some(observer);
        self
    }

    pub fn with_input_filter(mut self, filter: HistoryFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    pub fn with_is_enabled<P>(mut self, policy: P) -> Self
    where
        P: EnablementPolicy + 'static,
    {
        self.is_enabled = Some(Arc::new(policy));
        self
    }

    /// The agent control transfers to.
    pub fn agent(&self) -> &Arc<AgentDefinition> {
        &self.agent
    }

    pub fn has_policy(&self) -> bool {
        self.is_enabled.is_some()
    }

    /// Raw policy result; `Ok(true)` when no policy is configured.
    pub async fn check_enabled(&self, ctx: &RunContext, owner: &AgentDefinition) -> Result<bool> {
        match &self.is_enabled {
            Some(policy) => policy.is_enabled(ctx, owner).await,
            None => Ok(true),
        }
    }

    /// Whether to offer this handoff now. Policy errors count as not enabled.
    pub async fn is_offered(&self, ctx: &RunContext, owner: &AgentDefinition) -> bool {
        match self.check_enabled(ctx, owner).await {
            Ok(enabled) => {
                debug!(tool = %self.tool_name, enabled, "handoff enablement evaluated");
                enabled
            }
            Err(e) => {
                warn!(tool = %self.tool_name, error = %e, "handoff policy failed; not offering");
                false
            }
        }
    }

    /// Parses the model's raw tool arguments against the input schema.
    pub fn parse_input(&self, raw_arguments: &str) -> Result<HandoffInput> {
        let invalid = |message: String| AgentsError::InvalidHandoffInput {
            tool_name: self.tool_name.clone(),
            message,
        };
        if raw_arguments.trim().is_empty() {
            return Err(invalid("empty arguments".to_string()));
        }
        let value: Value =
            serde_json::from_str(raw_arguments).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }

    /// Runs the observer, if any. Failures are logged and swallowed.
    pub async fn notify(&self, event: &HandoffEvent) {
        let Some(observer) = &self.on_handoff else {
            return;
        };
        if let Err(e) = observer.on_handoff(event).await {
            warn!(
                run_id = %event.run_id,
                tool = %self.tool_name,
                error = %e,
                "handoff observer failed; continuing"
            );
        }
    }

    /// The history the target agent starts from.
    pub fn filter_history(
        &self,
        history: &[ChatCompletionRequestMessage],
    ) -> Vec<ChatCompletionRequestMessage> {
        match &self.input_filter {
            Some(filter) => filter(history),
            None => history.to_vec(),
        }
    }

    /// Tool spec advertised to the model.
    pub fn to_openai_tool(&self) -> Result<ChatCompletionTool> {
        function_tool(
            &self.tool_name,
            &self.tool_description,
            self.input_schema.clone(),
        )
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("tool_description", &self.tool_description)
            .field("agent", &self.agent.name())
            .field("has_observer", &self.on_handoff.is_some())
            .field("has_input_filter", &self.input_filter.is_some())
            .field("has_policy", &self.is_enabled.is_some())
            .finish()
    }
}

/// `transfer_to_<snake_case name>`.
pub fn default_tool_name(agent_name: &str) -> String {
    let mut snake = String::with_capacity(agent_name.len());
    for c in agent_name.trim().chars() {
        if c.is_alphanumeric() {
            snake.extend(c.to_lowercase());
        } else if !snake.ends_with('_') {
            snake.push('_');
        }
    }
    format!("transfer_to_{}", snake.trim_end_matches('_'))
}

fn default_tool_description(agent: &AgentDefinition) -> String {
    let mut description = format!(
        "Handoff to the {} agent to handle the request.",
        agent.name()
    );
    if let Some(extra) = agent.handoff_description() {
        description.push(' ');
        description.push_str(extra);
    }
    description
}

fn input_schema() -> Value {
    let schema = schemars::schema_for!(HandoffInput);
    serde_json::to_value(schema.schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"]
        })
    })
}

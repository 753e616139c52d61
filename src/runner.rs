//! # Runner
//!
//! Drives one conversation: asks the model for a reply, executes tool calls,
//! and moves control between agents when a handoff is selected. The runner is
//! the only place where the handoff contract is applied, and it applies it in
//! a fixed order on every turn:
//!
//! 1. evaluate each handoff's enablement policy; only enabled handoffs are
//!    advertised to the model (a failing policy counts as disabled);
//! 2. when the model selects a handoff, validate its input;
//! 3. re-check enablement;
//! 4. notify the handoff observer (failures are logged, never fatal);
//! 5. apply the history filter;
//! 6. transfer control to the target agent.
//!
//! Failures in steps 2–3 reject the handoff for this turn only: the model gets
//! a tool error back and the current agent carries on.

use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::{util::BoxCloneService, BoxError, Service, ServiceExt};
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::agent::AgentDefinition;
use crate::context::RunContext;
use crate::error::{AgentsError, Result};
use crate::handoff::{
    Handoff, HandoffEvent, HandoffInput, HandoffRecord, HandoffRejection, HandoffStage,
};
use crate::provider::{ModelService, OpenAIProvider, ProviderResponse};
use crate::tool::{ToolInvocation, ToolRouter};

/// Boxed provider service shared by runs.
pub type ProviderSvc = BoxCloneService<CreateChatCompletionRequest, ProviderResponse, BoxError>;

/// Limits and model defaults for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Model used by agents that do not override it.
    pub model: String,
    pub max_turns: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Deadline for the whole run.
    pub timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_turns: 10,
            temperature: None,
            max_tokens: None,
            timeout: None,
        }
    }
}

/// Token accounting across all model calls of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub requests: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    /// Text of the last assistant reply.
    pub final_output: String,
    /// The agent that produced `final_output`.
    pub last_agent: Arc<AgentDefinition>,
    /// Conversation as seen by `last_agent`, without its system instructions.
    pub messages: Vec<ChatCompletionRequestMessage>,
    pub handoffs: Vec<HandoffRecord>,
    pub rejections: Vec<HandoffRejection>,
    pub turns: usize,
    pub usage: Usage,
}

impl RunResult {
    pub fn last_agent_name(&self) -> &str {
        self.last_agent.name()
    }
}

/// Executes agents against a model provider.
///
/// Cheap to clone; clones share the provider.
#[derive(Clone)]
pub struct Runner {
    provider: Arc<Mutex<ProviderSvc>>,
    config: RunConfig,
}

impl Runner {
    pub fn new<P>(provider: P, config: RunConfig) -> Self
    where
        P: ModelService + Clone + Send + 'static,
        P::Future: Send + 'static,
    {
        Self {
            provider: Arc::new(Mutex::new(BoxCloneService::new(provider))),
            config,
        }
    }

    /// Runner backed by the OpenAI chat completions API.
    pub fn openai(client: Arc<Client<OpenAIConfig>>, config: RunConfig) -> Self {
        Self::new(OpenAIProvider::new(client), config)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs `agent` on `input` until an agent replies without tool calls.
    ///
    /// Dropping the returned future (or hitting [`RunConfig::timeout`])
    /// abandons any in-flight policy check or observer; a handoff is only
    /// recorded once control has actually moved.
    pub async fn run(
        &self,
        agent: Arc<AgentDefinition>,
        input: impl Into<String>,
        context: RunContext,
    ) -> Result<RunResult> {
        let input = input.into();
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, agent = %agent.name());
        info!(parent: &span, "starting run");

        let fut = self.run_loop(run_id, agent, input, context).instrument(span);
        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| AgentsError::RunTimedOut { elapsed: limit })?,
            None => fut.await,
        }
    }

    /// Blocking wrapper around [`Runner::run`] on a fresh tokio runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn run_sync(
        &self,
        agent: Arc<AgentDefinition>,
        input: impl Into<String>,
        context: RunContext,
    ) -> Result<RunResult> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.run(agent, input, context))
    }

    async fn run_loop(
        &self,
        run_id: Uuid,
        agent: Arc<AgentDefinition>,
        input: String,
        context: RunContext,
    ) -> Result<RunResult> {
        let max_turns = self.config.max_turns;
        let mut current = agent;
        let mut history: Vec<ChatCompletionRequestMessage> = vec![user_message(&input)?];
        let mut handoffs: Vec<HandoffRecord> = Vec::new();
        let mut rejections: Vec<HandoffRejection> = Vec::new();
        let mut usage = Usage::default();

        for turn in 1..=max_turns {
            debug!(turn, agent = %current.name(), "starting turn");

            let mut offered: Vec<Handoff> = Vec::new();
            for handoff in current.handoffs() {
                if handoff.is_offered(&context, &current).await {
                    trace!(tool = %handoff.tool_name, stage = %HandoffStage::Offered, "handoff offered");
                    offered.push(handoff.clone());
                } else {
                    trace!(tool = %handoff.tool_name, stage = %HandoffStage::Rejected, "handoff withheld this turn");
                }
            }

            let request = self.build_request(&current, &history, &offered)?;
            let response = self.call_model(request).await?;
            usage.requests += 1;
            usage.prompt_tokens += response.prompt_tokens;
            usage.completion_tokens += response.completion_tokens;

            let assistant = response.assistant;
            let tool_calls = assistant.tool_calls.clone().unwrap_or_default();
            history.push(assistant_message(assistant.content.as_deref(), &tool_calls)?);

            if tool_calls.is_empty() {
                let final_output = assistant.content.unwrap_or_default();
                info!(
                    agent = %current.name(),
                    turns = turn,
                    handoffs = handoffs.len(),
                    "run complete"
                );
                return Ok(RunResult {
                    run_id,
                    final_output,
                    last_agent: current,
                    messages: history,
                    handoffs,
                    rejections,
                    turns: turn,
                    usage,
                });
            }

            let mut router = ToolRouter::new(current.tools());
            let mut selected: Option<(Handoff, HandoffInput)> = None;

            for call in &tool_calls {
                let name = call.function.name.as_str();

                if let Some(handoff) = offered.iter().find(|h| h.tool_name == name) {
                    trace!(tool = name, stage = %HandoffStage::Selected, "handoff selected");
                    if selected.is_some() {
                        warn!(tool = name, "multiple handoffs in one reply; ignoring this one");
                        history.push(tool_message(
                            &call.id,
                            &json!({ "error": "Multiple handoffs detected, ignoring this one." }),
                        )?);
                        continue;
                    }

                    let input = match handoff.parse_input(&call.function.arguments) {
                        Ok(input) => input,
                        Err(e) => {
                            warn!(tool = name, error = %e, "handoff input rejected");
                            history.push(tool_message(&call.id, &json!({ "error": e.to_string() }))?);
                            rejections.push(HandoffRejection {
                                tool_name: name.to_string(),
                                stage: HandoffStage::Validated,
                                error: e.to_string(),
                            });
                            continue;
                        }
                    };
                    trace!(tool = name, stage = %HandoffStage::Validated, "handoff input valid");

                    if !handoff.is_offered(&context, &current).await {
                        let e = AgentsError::HandoffNotEnabled {
                            tool_name: name.to_string(),
                        };
                        warn!(tool = name, "handoff disabled after selection");
                        history.push(tool_message(&call.id, &json!({ "error": e.to_string() }))?);
                        rejections.push(HandoffRejection {
                            tool_name: name.to_string(),
                            stage: HandoffStage::EnabledChecked,
                            error: e.to_string(),
                        });
                        continue;
                    }
                    trace!(tool = name, stage = %HandoffStage::EnabledChecked, "handoff still enabled");

                    history.push(tool_message(
                        &call.id,
                        &json!({ "assistant": handoff.agent().name() }),
                    )?);
                    selected = Some((handoff.clone(), input));
                } else if current.handoff(name).is_some() {
                    let e = AgentsError::HandoffNotEnabled {
                        tool_name: name.to_string(),
                    };
                    warn!(tool = name, "model called a handoff that was not offered");
                    history.push(tool_message(&call.id, &json!({ "error": e.to_string() }))?);
                    rejections.push(HandoffRejection {
                        tool_name: name.to_string(),
                        stage: HandoffStage::Offered,
                        error: e.to_string(),
                    });
                } else {
                    let output = invoke_tool(&mut router, call).await;
                    history.push(tool_message(&call.id, &output)?);
                }
            }

            if let Some((handoff, input)) = selected {
                let target = handoff.agent().clone();
                let event = HandoffEvent {
                    run_id,
                    from_agent: current.name().to_string(),
                    to_agent: target.name().to_string(),
                    tool_name: handoff.tool_name.clone(),
                    input,
                    context: context.clone(),
                    at: Utc::now(),
                };

                handoff.notify(&event).await;
                trace!(tool = %handoff.tool_name, stage = %HandoffStage::CallbackRun, "observer notified");

                let before = history.len();
                history = handoff.filter_history(&history);
                trace!(
                    tool = %handoff.tool_name,
                    stage = %HandoffStage::Filtered,
                    before,
                    after = history.len(),
                    "history filtered"
                );

                info!(
                    from = %event.from_agent,
                    to = %event.to_agent,
                    reason = %event.input.reason,
                    stage = %HandoffStage::Delegated,
                    "handoff delegated"
                );
                handoffs.push(HandoffRecord {
                    from_agent: event.from_agent,
                    to_agent: event.to_agent,
                    tool_name: event.tool_name,
                    reason: event.input.reason,
                });
                current = target;
            }
        }

        warn!(max_turns, "run exceeded turn limit");
        Err(AgentsError::MaxTurnsExceeded { max_turns })
    }

    fn build_request(
        &self,
        agent: &AgentDefinition,
        history: &[ChatCompletionRequestMessage],
        offered: &[Handoff],
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(agent.instructions())
                .build()?
                .into(),
        );
        messages.extend(history.iter().cloned());

        let mut tools = Vec::with_capacity(agent.tools().len() + offered.len());
        for tool in agent.tools() {
            tools.push(tool.to_openai_tool()?);
        }
        for handoff in offered {
            tools.push(handoff.to_openai_tool()?);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(agent.model().unwrap_or(&self.config.model))
            .messages(messages);
        if !tools.is_empty() {
            builder.tools(tools);
        }
        if let Some(t) = agent.temperature().or(self.config.temperature) {
            builder.temperature(t);
        }
        if let Some(mt) = self.config.max_tokens {
            builder.max_completion_tokens(mt);
        }
        Ok(builder.build()?)
    }

    async fn call_model(&self, request: CreateChatCompletionRequest) -> Result<ProviderResponse> {
        // Clone out of the lock so concurrent runs do not serialize on the model call.
        let mut svc = self.provider.lock().await.clone();
        let ready = ServiceExt::ready(&mut svc).await.map_err(provider_error)?;
        ready.call(request).await.map_err(provider_error)
    }
}

fn provider_error(e: BoxError) -> AgentsError {
    AgentsError::ProviderError {
        message: e.to_string(),
    }
}

async fn invoke_tool(router: &mut ToolRouter, call: &ChatCompletionMessageToolCall) -> Value {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        json!({})
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = %call.function.name, error = %e, "tool arguments are not JSON");
                return tool_error(format!("invalid arguments: {}", e));
            }
        }
    };

    let invocation = ToolInvocation {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments,
    };
    let result = match ServiceExt::ready(router).await {
        Ok(svc) => svc.call(invocation).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(output) => {
            debug!(tool = %call.function.name, "tool succeeded");
            output.result
        }
        Err(e) => {
            warn!(tool = %call.function.name, error = %e, "tool failed");
            tool_error(e.to_string())
        }
    }
}

fn tool_error(message: String) -> Value {
    let err = AgentsError::ToolExecutionError { message };
    json!({ "error": err.to_string() })
}

/// A user message for the start of a conversation.
pub fn user_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(text)
        .build()?
        .into())
}

fn assistant_message(
    content: Option<&str>,
    tool_calls: &[ChatCompletionMessageToolCall],
) -> Result<ChatCompletionRequestMessage> {
    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
    builder.content(content.unwrap_or(""));
    if !tool_calls.is_empty() {
        builder.tool_calls(tool_calls.to_vec());
    }
    Ok(builder.build()?.into())
}

fn tool_message(tool_call_id: &str, output: &Value) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestToolMessageArgs::default()
        .content(output.to_string())
        .tool_call_id(tool_call_id)
        .build()?
        .into())
}

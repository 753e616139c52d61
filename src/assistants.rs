//! The two agents of the demo and the handoff between them.
//!
//! - "Helpful Assistant" answers directly, uses `weather` for weather questions
//!   and delegates math questions through `special_math_teacher`.
//! - "Math Teacher" has an `add` tool and only sees the user/assistant dialogue
//!   (tool records are stripped on the way in).
//! - The handoff is offered only to adults (`age >= 18` in the run context).

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tower::BoxError;
use tracing::info;

use crate::agent::AgentDefinition;
use crate::error::Result;
use crate::filters::remove_all_tools;
use crate::handoff::{prompt_with_handoff_instructions, Handoff, HandoffObserver};
use crate::policy::adults_only;
use crate::tool::{tool_typed, ToolDef};

pub const HELPFUL_ASSISTANT: &str = "Helpful Assistant";
pub const MATH_TEACHER: &str = "Math Teacher";
pub const MATH_TEACHER_TOOL: &str = "special_math_teacher";

const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful assistant.
- If the user's query is **related to math**, use the `special_math_teacher` handoff.
- If the user's query is **related to weather**, use the `weather` tool.
- For any other query, respond directly without calling a tool or handoff.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    pub city: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddArgs {
    pub a: i64,
    pub b: i64,
}

/// Weather lookup; always sunny.
pub fn weather() -> ToolDef {
    tool_typed("weather", "Weather Tool", |args: WeatherArgs| async move {
        info!(city = %args.city, "weather tool called");
        Ok::<_, BoxError>(format!("{} weather is sunny.", args.city))
    })
}

/// Integer addition.
pub fn add() -> ToolDef {
    tool_typed("add", "Addition Tool", |args: AddArgs| async move {
        info!(a = args.a, b = args.b, "add tool called");
        args.a
            .checked_add(args.b)
            .ok_or_else(|| BoxError::from("integer overflow"))
    })
}

pub fn math_assistant(model: Option<&str>) -> Result<AgentDefinition> {
    let mut builder = AgentDefinition::builder(MATH_TEACHER)
        .instructions(prompt_with_handoff_instructions(
            "You are a helpful math teacher agent.",
        ))
        .handoff_description("This is a special Math Assistant.")
        .tool(add());
    if let Some(m) = model {
        builder = builder.model(m);
    }
    builder.build()
}

/// The age-gated, tool-stripping handoff to the math teacher.
pub fn math_teacher(model: Option<&str>, observer: Arc<dyn HandoffObserver>) -> Result<Handoff> {
    Ok(Handoff::new(math_assistant(model)?)
        .with_tool_name(MATH_TEACHER_TOOL)
        .with_tool_description("This is a special Mathematics Teacher.")
        .with_shared_observer(observer)
        .with_input_filter(Arc::new(remove_all_tools))
        .with_is_enabled(adults_only()))
}

pub fn helpful_assistant(
    model: Option<&str>,
    observer: Arc<dyn HandoffObserver>,
) -> Result<AgentDefinition> {
    let mut builder = AgentDefinition::builder(HELPFUL_ASSISTANT)
        .instructions(ASSISTANT_INSTRUCTIONS)
        .tool(weather())
        .handoff(math_teacher(model, observer)?);
    if let Some(m) = model {
        builder = builder.model(m);
    }
    builder.build()
}

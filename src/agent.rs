//! # Agent definitions
//!
//! An [`AgentDefinition`] is a configured participant in a run: a name,
//! instructions, an optional model override, tools, and handoffs to other
//! agents. Everything is injected through [`AgentBuilder`]; there is no global
//! registry. Definitions are immutable once built and may be shared across
//! concurrent runs behind an `Arc`.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::error::{AgentsError, Result};
use crate::handoff::{Handoff, HandoffStage};
use crate::tool::ToolDef;

/// Static configuration of one agent.
pub struct AgentDefinition {
    name: String,

    /// System instructions sent ahead of the conversation on every turn.
    instructions: String,

    /// Shown to other agents when this one is a handoff target.
    handoff_description: Option<String>,

    /// Model override; the run's default model is used when `None`.
    model: Option<String>,

    temperature: Option<f32>,

    tools: Vec<ToolDef>,

    handoffs: Vec<Handoff>,
}

impl AgentDefinition {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            instructions: String::new(),
            handoff_description: None,
            model: None,
            temperature: None,
            tools: Vec::new(),
            handoffs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    /// Looks up a handoff by the tool name the model sees.
    pub fn handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name == tool_name)
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("model", &self.model)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name).collect::<Vec<_>>(),
            )
            .field("handoffs", &self.handoffs)
            .finish()
    }
}

/// Builder for [`AgentDefinition`].
pub struct AgentBuilder {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    tools: Vec<ToolDef>,
    handoffs: Vec<Handoff>,
}

impl AgentBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn tool(mut self, tool: ToolDef) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Validates and freezes the definition.
    ///
    /// Fails on an empty name or instructions, and when two tools or handoffs
    /// would be advertised to the model under the same name.
    pub fn build(self) -> Result<AgentDefinition> {
        if self.name.trim().is_empty() {
            return Err(AgentsError::config("agent name must not be empty"));
        }
        if self.instructions.trim().is_empty() {
            return Err(AgentsError::config(format!(
                "agent '{}' has no instructions",
                self.name
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let exposed = self
            .tools
            .iter()
            .map(|t| t.name)
            .chain(self.handoffs.iter().map(|h| h.tool_name.as_str()));
        for tool_name in exposed {
            if tool_name.trim().is_empty() {
                return Err(AgentsError::config(format!(
                    "agent '{}' exposes a tool with an empty name",
                    self.name
                )));
            }
            if !seen.insert(tool_name) {
                return Err(AgentsError::config(format!(
                    "agent '{}' exposes '{}' more than once",
                    self.name, tool_name
                )));
            }
        }

        for handoff in &self.handoffs {
            debug!(
                agent = %self.name,
                tool = %handoff.tool_name,
                target = %handoff.agent().name(),
                stage = %HandoffStage::Registered,
                "handoff registered"
            );
        }

        Ok(AgentDefinition {
            name: self.name,
            instructions: self.instructions,
            handoff_description: self.handoff_description,
            model: self.model,
            temperature: self.temperature,
            tools: self.tools,
            handoffs: self.handoffs,
        })
    }
}

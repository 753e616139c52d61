//! Enablement policies for handoffs
//!
//! A policy is consulted on every turn, before a handoff is offered to the
//! model, and once more right before a selected handoff runs. Policies read the
//! [`RunContext`] and the agent that owns the handoff; they must not mutate
//! anything and must be safe to call concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::AgentDefinition;
use crate::context::RunContext;
use crate::error::Result;

/// Gate deciding whether a handoff is offered on a given turn.
///
/// Returning an error means the context did not have the shape the policy
/// needs. Callers must never treat an error as enabled.
#[async_trait]
pub trait EnablementPolicy: Send + Sync {
    async fn is_enabled(&self, ctx: &RunContext, agent: &AgentDefinition) -> Result<bool>;
}

/// Enabled iff `context.age >= years`; a missing age is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumAge {
    pub years: u32,
}

#[async_trait]
impl EnablementPolicy for MinimumAge {
    async fn is_enabled(&self, ctx: &RunContext, agent: &AgentDefinition) -> Result<bool> {
        let age = ctx.require_age()?;
        let enabled = age >= self.years;
        debug!(
            agent = agent.name(),
            age,
            min_age = self.years,
            enabled,
            "evaluated age policy"
        );
        Ok(enabled)
    }
}

/// The age gate used by the math teacher handoff.
pub fn adults_only() -> MinimumAge {
    MinimumAge { years: 18 }
}

/// A policy with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Always(pub bool);

#[async_trait]
impl EnablementPolicy for Always {
    async fn is_enabled(&self, _ctx: &RunContext, _agent: &AgentDefinition) -> Result<bool> {
        Ok(self.0)
    }
}

/// Function-backed policy for ergonomic composition.
#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub struct PolicyFn(
    pub Arc<dyn Fn(&RunContext, &AgentDefinition) -> Result<bool> + Send + Sync + 'static>,
);

#[async_trait]
impl EnablementPolicy for PolicyFn {
    async fn is_enabled(&self, ctx: &RunContext, agent: &AgentDefinition) -> Result<bool> {
        (self.0)(ctx, agent)
    }
}

pub fn policy_fn<F>(f: F) -> PolicyFn
where
    F: Fn(&RunContext, &AgentDefinition) -> Result<bool> + Send + Sync + 'static,
{
    PolicyFn(Arc::new(f))
}

//! # Advanced handoff
//!
//! Two cooperating agents and a gated handoff between them, run on a small
//! tower-based loop over OpenAI-compatible chat completions.
//!
//! ## Core Concepts
//!
//! - **AgentDefinition**: name, instructions, model, tools and handoffs, all
//!   injected at construction time
//! - **Handoff**: a tool the model can call to delegate the conversation to
//!   another agent, with an enablement policy, a typed input (`reason`), an
//!   observer and a history filter
//! - **RunContext**: caller-supplied data visible to policies and observers but
//!   never to the model
//! - **Runner**: applies the handoff contract turn by turn
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use advanced_handoff::assistants::helpful_assistant;
//! use advanced_handoff::{AppConfig, LoggingObserver, RunContext, Runner};
//! use std::sync::Arc;
//!
//! # fn example() -> advanced_handoff::Result<()> {
//! let config = AppConfig::from_env()?;
//! let agent = Arc::new(helpful_assistant(None, Arc::new(LoggingObserver))?);
//! let runner = Runner::openai(config.openai_client(), config.run_config());
//!
//! let result = runner.run_sync(
//!     agent,
//!     "What is 2+10?",
//!     RunContext::new().with_name("Sam").with_age(20),
//! )?;
//! println!("{}: {}", result.last_agent_name(), result.final_output);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod assistants;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod handoff;
pub mod policy;
pub mod provider;
pub mod runner;
pub mod tool;

pub use agent::{AgentBuilder, AgentDefinition};
pub use config::{AppConfig, ConfigBuilder};
pub use context::RunContext;
pub use error::{AgentsError, Result};
pub use filters::{remove_all_tools, HistoryFilter};
pub use handoff::{
    Handoff, HandoffEvent, HandoffInput, HandoffObserver, HandoffRecord, HandoffRejection,
    HandoffStage, LoggingObserver,
};
pub use policy::{EnablementPolicy, MinimumAge};
pub use provider::{FixedProvider, FnProvider, ModelService, OpenAIProvider, ProviderResponse};
pub use runner::{RunConfig, RunResult, Runner, Usage};
pub use tool::{tool_typed, ToolDef};

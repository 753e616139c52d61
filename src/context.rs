//! # Run Context
//!
//! Caller-supplied side-channel data for a single run. The model never sees it;
//! enablement policies and handoff observers do.
//!
//! The context is typed at the boundary: the known keys (`name`, `age`, `role`)
//! are parsed when the context is constructed, so a malformed `age` is rejected
//! up front instead of surprising a policy mid-run. Any other keys are kept in
//! [`RunContext::extra`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentsError, Result};

/// Read-only context passed unchanged through a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Keys without a typed field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from an arbitrary JSON object, validating the known keys.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(AgentsError::InvalidContext {
                message: format!("expected a JSON object, got {}", value),
            });
        }
        serde_json::from_value(value).map_err(|e| AgentsError::InvalidContext {
            message: e.to_string(),
        })
    }

    /// Builds a context from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| AgentsError::InvalidContext {
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Adds an untyped key.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The `age` field, or a missing-field error.
    pub fn require_age(&self) -> Result<u32> {
        self.age.ok_or_else(|| AgentsError::MissingContextField {
            field: "age".to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// The context as a JSON value, for logging and events.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

//! Stage agents: research, planning and code generation.
//!
//! Each agent asks the text generator for a JSON payload, checks its shape,
//! and degrades to a deterministic value built from its inputs when the call
//! or the parse fails. Agents never return an error to the pipeline; the
//! fallbacks they took are reported in the returned [`Traced`] log.
//!
//! [`Traced`]: crate::fallback::Traced

pub mod codegen;
pub mod planner;
pub mod research;
pub mod templates;

use std::fmt;

use serde::de::DeserializeOwned;

pub use codegen::CodegenAgent;
pub use planner::PlannerAgent;
pub use research::ResearchAgent;

use crate::error::{Error, Result};
use crate::llm::{GenerationParams, TextGenerator, parse_structured_payload};

/// Agent identities, used as log and tracing labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Researcher,
    Planner,
    Builder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Researcher => write!(f, "research"),
            Role::Planner => write!(f, "planning"),
            Role::Builder => write!(f, "codegen"),
        }
    }
}

/// One generator call whose reply must contain a `T` that passes `check`.
pub(crate) async fn ask<T: DeserializeOwned>(
    llm: &dyn TextGenerator,
    prompt: &str,
    params: GenerationParams,
    check: impl FnOnce(&T) -> std::result::Result<(), String>,
) -> Result<T> {
    let reply = llm.generate(prompt, params).await?;
    let value: T = parse_structured_payload(&reply)?;
    check(&value).map_err(Error::Parse)?;
    Ok(value)
}

/// Render a value as pretty JSON for prompt context.
pub(crate) fn json_context<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

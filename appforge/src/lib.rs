//! appforge: turn an app description into a researched plan, generated
//! source, an optimization report and, optionally, a live deployment.
//!
//! The entry point is [`pipeline::Pipeline::run`]. Deployments made during
//! a run can be inspected and rolled back through
//! [`deploy::Deployments`].

pub mod agents;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod model;
pub mod optimize;
pub mod pipeline;
pub mod search;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunOptions, RunResult};

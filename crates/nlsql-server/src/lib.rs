//! NL→SQL service: configuration, orchestration and the HTTP / MCP surfaces
//!
//! The [`pipeline::Orchestrator`] owns one schema provider, one database
//! gateway and both translation strategies, and turns every outcome into a
//! [`envelope::ResponseEnvelope`].

pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod pipeline;

pub use config::{Config, ConfigError, Protocol};
pub use envelope::{normalize, ResponseEnvelope, ResultData, Status};
pub use error::PipelineError;
pub use pipeline::{Orchestrator, StartupError};

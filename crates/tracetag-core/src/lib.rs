//! Core library for tracetag: enriches recorded Claude Code session traces
//! with git provenance, modified-file, and token-usage metadata, and merges
//! the hook wiring for the tracing backend into `.claude/settings.json`.

pub mod client;
pub mod config;
pub mod databricks;
pub mod enrich;
pub mod error;
pub mod git;
pub mod hook;
pub mod settings;
pub mod transcript;

pub use client::{MlflowClient, TracingClient};
pub use config::BackendConfig;
pub use enrich::Facet;
pub use error::{ClientError, CoreError};
pub use settings::SettingsDocument;

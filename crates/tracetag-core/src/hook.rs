use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::client::TracingClient;
use crate::config::HookEnv;
use crate::enrich;
use crate::error::CoreError;
use crate::settings;

/// Payload Claude Code writes to the hook's stdin. All fields optional:
/// the handler degrades instead of rejecting partial input.
#[derive(Debug, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl HookInput {
    /// Parse hook input from stdin contents. Empty or malformed input is
    /// treated as an empty payload.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!("malformed hook input: {e}");
            Self::default()
        })
    }
}

/// The single JSON object emitted on stdout for every hook invocation.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HookResponse {
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookResponse {
    pub fn ok() -> Self {
        Self {
            proceed: true,
            error: None,
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            proceed: true,
            error: Some(message.into()),
        }
    }
}

/// Handle the Stop event: enrich the session's trace with the active
/// facets.
///
/// Degraded conditions (tracing disabled, nothing to tag, no reachable
/// backend, missing input fields) produce an `Ok` response so the host is
/// never blocked; only backend call failures propagate as errors, which
/// the caller reports in the response and converts into a non-zero exit.
pub fn handle_stop<C: TracingClient + ?Sized>(
    input: &HookInput,
    env: &HookEnv,
    client: Option<&C>,
    project_root: &Path,
) -> Result<HookResponse, CoreError> {
    if !env.enabled {
        return Ok(HookResponse::ok());
    }

    let Some(transcript_path) = input.transcript_path.as_deref() else {
        return Ok(HookResponse::with_error("No transcript_path provided"));
    };

    let facets = active_facets(env, project_root);
    if facets.is_empty() {
        tracing::debug!("no enrichment facets active");
        return Ok(HookResponse::ok());
    }

    let cwd = input
        .cwd
        .as_deref()
        .map(Path::new)
        .unwrap_or(project_root);
    let tags = enrich::collect_enrichments(&facets, Some(Path::new(transcript_path)), cwd);
    if tags.is_empty() {
        return Ok(HookResponse::ok());
    }

    let Some(client) = client else {
        tracing::info!("no remote tracking endpoint configured, skipping trace tags");
        return Ok(HookResponse::ok());
    };
    let Some(session_id) = input.session_id.as_deref() else {
        return Ok(HookResponse::with_error("No session_id provided"));
    };
    let Some(experiment) = env.experiment.as_deref() else {
        return Ok(HookResponse::with_error("No experiment configured"));
    };

    let Some(info) = client.experiment_by_name(experiment)? else {
        return Ok(HookResponse::with_error(format!(
            "Experiment {experiment} not found"
        )));
    };
    let Some(request_id) = client.resolve_trace(&info.experiment_id, session_id)? else {
        return Ok(HookResponse::with_error(format!(
            "No trace found for session {session_id}"
        )));
    };

    tracing::info!("setting {} trace tags on {request_id}", tags.len());
    for (key, value) in &tags {
        client.set_trace_tag(&request_id, key, value)?;
    }

    Ok(HookResponse::ok())
}

/// Resolve the active facet list: process environment first, settings file
/// as the fallback (hook processes do not always inherit the configured
/// environment).
fn active_facets(env: &HookEnv, project_root: &Path) -> Vec<enrich::Facet> {
    let raw = env
        .enrichments
        .clone()
        .or_else(|| settings::enrichments_from_settings(project_root))
        .unwrap_or_default();
    enrich::parse_facet_list(&raw)
}

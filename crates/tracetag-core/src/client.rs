use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::databricks;
use crate::enrich::Facet;
use crate::error::ClientError;

/// Cap on any single backend call. Connectivity verification relies on
/// this instead of an interrupt: same observable 30-second bound, portable.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many recent traces to inspect when detecting already-used facets.
const DETECT_TRACE_LIMIT: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentInfo {
    pub experiment_id: String,
    #[serde(default)]
    pub name: String,
}

/// The tracing backend, seen through the only operations this tool needs:
/// locating a session's trace, tagging it, and inspecting experiments.
/// Trace creation belongs to the backend and is deliberately absent.
pub trait TracingClient {
    fn experiment_by_name(&self, name: &str) -> Result<Option<ExperimentInfo>, ClientError>;

    fn resolve_trace(
        &self,
        experiment_id: &str,
        session_id: &str,
    ) -> Result<Option<String>, ClientError>;

    fn set_trace_tag(&self, request_id: &str, key: &str, value: &str) -> Result<(), ClientError>;

    /// Tag keys across the most recent traces of an experiment.
    fn recent_trace_tag_keys(&self, experiment_id: &str) -> Result<Vec<String>, ClientError>;
}

/// True iff the backend answered the experiment lookup at all. A missing
/// experiment still verifies; only transport or auth failures do not.
pub fn verify_connection<C: TracingClient + ?Sized>(client: &C, experiment: &str) -> bool {
    client.experiment_by_name(experiment).is_ok()
}

/// Detect which facets existing traces already carry, from their tag-key
/// prefixes. `None` means detection was not possible (missing experiment or
/// backend error) and the caller should continue without reconciling.
pub fn detect_facets<C: TracingClient + ?Sized>(
    client: &C,
    experiment: &str,
) -> Option<BTreeSet<Facet>> {
    let info = match client.experiment_by_name(experiment) {
        Ok(Some(info)) => info,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("enrichment detection failed: {e}");
            return None;
        }
    };
    let keys = match client.recent_trace_tag_keys(&info.experiment_id) {
        Ok(keys) => keys,
        Err(e) => {
            tracing::warn!("enrichment detection failed: {e}");
            return None;
        }
    };
    Some(
        keys.iter()
            .filter_map(|key| key.split('.').next())
            .filter_map(|prefix| prefix.parse::<Facet>().ok())
            .collect(),
    )
}

/// MLflow REST client (blocking). Works against a plain tracking server or
/// a Databricks workspace resolved from a credential profile.
pub struct MlflowClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
}

impl MlflowClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build a client from a Databricks profile's stored host and token.
    pub fn for_profile(profile: &str) -> Result<Self, ClientError> {
        let entry = databricks::find_profile(profile)
            .ok_or_else(|| ClientError::MissingCredentials(profile.to_string()))?;
        let (Some(host), Some(token)) = (entry.host, entry.token) else {
            return Err(ClientError::MissingCredentials(profile.to_string()));
        };
        Self::new(host, Some(token))
    }

    /// Build a client from a tracking URI. `databricks://<profile>` is
    /// resolved through the profile store; plain `http(s)://` is used
    /// directly. Anything else (a local file store) has no remote endpoint
    /// to tag against, and yields `None`.
    pub fn from_tracking_uri(uri: &str) -> Result<Option<Self>, ClientError> {
        if let Some(profile) = uri.strip_prefix("databricks://") {
            let profile = if profile.is_empty() { "DEFAULT" } else { profile };
            return Self::for_profile(profile).map(Some);
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Self::new(uri, None).map(Some);
        }
        Ok(None)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::blocking::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn search_traces(
        &self,
        experiment_id: &str,
        filter: Option<String>,
        max_results: usize,
    ) -> Result<Vec<TraceInfo>, ClientError> {
        let body = SearchTracesRequest {
            experiment_ids: vec![experiment_id.to_string()],
            filter,
            max_results,
            order_by: vec!["timestamp_ms DESC".to_string()],
        };
        let resp = Self::check(
            self.request(reqwest::Method::POST, "/api/2.0/mlflow/traces/search")
                .json(&body)
                .send()?,
        )?;
        let parsed: SearchTracesResponse = resp.json()?;
        Ok(parsed.traces)
    }
}

impl TracingClient for MlflowClient {
    fn experiment_by_name(&self, name: &str) -> Result<Option<ExperimentInfo>, ClientError> {
        let path = format!(
            "/api/2.0/mlflow/experiments/get-by-name?experiment_name={}",
            urlencoding::encode(name)
        );
        let resp = self.request(reqwest::Method::GET, &path).send()?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let resp = Self::check(resp)?;
        let parsed: ExperimentResponse = resp.json()?;
        Ok(Some(parsed.experiment))
    }

    fn resolve_trace(
        &self,
        experiment_id: &str,
        session_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let filter = format!("tags.`mlflow.trace.session` = '{session_id}'");
        let traces = self.search_traces(experiment_id, Some(filter), 1)?;
        Ok(traces.into_iter().next().map(|t| t.request_id))
    }

    fn set_trace_tag(&self, request_id: &str, key: &str, value: &str) -> Result<(), ClientError> {
        let path = format!("/api/2.0/mlflow/traces/{request_id}/tags");
        let body = TraceTag {
            key: key.to_string(),
            value: value.to_string(),
        };
        Self::check(
            self.request(reqwest::Method::PATCH, &path)
                .json(&body)
                .send()?,
        )?;
        Ok(())
    }

    fn recent_trace_tag_keys(&self, experiment_id: &str) -> Result<Vec<String>, ClientError> {
        let traces = self.search_traces(experiment_id, None, DETECT_TRACE_LIMIT)?;
        Ok(traces
            .into_iter()
            .flat_map(|t| t.tags)
            .map(|tag| tag.key)
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct SearchTracesRequest {
    experiment_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    max_results: usize,
    order_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct SearchTracesResponse {
    #[serde(default)]
    traces: Vec<TraceInfo>,
}

#[derive(Debug, Deserialize)]
struct TraceInfo {
    request_id: String,
    #[serde(default)]
    tags: Vec<TraceTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TraceTag {
    key: String,
    #[serde(default)]
    value: String,
}

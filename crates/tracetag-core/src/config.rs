/// Environment variable naming the active enrichment facets (comma-separated).
pub const ENRICHMENTS_VAR: &str = "TRACETAG_ENRICHMENTS";
/// Environment variable gating the hook handler.
pub const TRACING_ENABLED_VAR: &str = "TRACETAG_TRACING_ENABLED";
/// Tracking endpoint consumed by the backend client.
pub const TRACKING_URI_VAR: &str = "MLFLOW_TRACKING_URI";
/// Experiment the session traces are recorded under.
pub const EXPERIMENT_VAR: &str = "MLFLOW_EXPERIMENT_NAME";
/// Databricks credential profile, when workspace storage is selected.
pub const PROFILE_VAR: &str = "DATABRICKS_CONFIG_PROFILE";

/// Where the backend stores traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStorage {
    /// Local `mlruns/` folder, no credentials required.
    Local,
    /// Databricks workspace, addressed through a named credential profile.
    Databricks { profile: String },
}

/// Backend wiring produced by setup and merged into the settings file.
/// Threaded as an explicit parameter; the process environment is only the
/// external boundary, never internal plumbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub storage: TraceStorage,
    pub experiment: String,
}

impl BackendConfig {
    pub fn local(experiment: impl Into<String>) -> Self {
        Self {
            storage: TraceStorage::Local,
            experiment: experiment.into(),
        }
    }

    pub fn databricks(profile: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            storage: TraceStorage::Databricks {
                profile: profile.into(),
            },
            experiment: experiment.into(),
        }
    }

    /// The environment entries this backend wiring contributes to the
    /// settings file.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = vec![(TRACING_ENABLED_VAR.to_string(), "true".to_string())];
        if let TraceStorage::Databricks { profile } = &self.storage {
            env.push((TRACKING_URI_VAR.to_string(), format!("databricks://{profile}")));
            env.push((PROFILE_VAR.to_string(), profile.clone()));
        }
        env.push((EXPERIMENT_VAR.to_string(), self.experiment.clone()));
        env
    }
}

/// Runtime view of the hook-relevant environment, captured once at the
/// process boundary.
#[derive(Debug, Clone, Default)]
pub struct HookEnv {
    pub enabled: bool,
    pub tracking_uri: Option<String>,
    pub experiment: Option<String>,
    pub enrichments: Option<String>,
}

impl HookEnv {
    pub fn from_process_env() -> Self {
        Self {
            enabled: std::env::var(TRACING_ENABLED_VAR)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            tracking_uri: non_empty_var(TRACKING_URI_VAR),
            experiment: non_empty_var(EXPERIMENT_VAR),
            enrichments: non_empty_var(ENRICHMENTS_VAR),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_environment() {
        let env = BackendConfig::local("myproj").environment();
        assert_eq!(
            env,
            vec![
                (TRACING_ENABLED_VAR.to_string(), "true".to_string()),
                (EXPERIMENT_VAR.to_string(), "myproj".to_string()),
            ]
        );
    }

    #[test]
    fn test_databricks_environment() {
        let env = BackendConfig::databricks("work", "/Workspace/Shared/myproj").environment();
        assert!(env.contains(&(
            TRACKING_URI_VAR.to_string(),
            "databricks://work".to_string()
        )));
        assert!(env.contains(&(PROFILE_VAR.to_string(), "work".to_string())));
        assert!(env.contains(&(
            EXPERIMENT_VAR.to_string(),
            "/Workspace/Shared/myproj".to_string()
        )));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("enabled"));
    }
}

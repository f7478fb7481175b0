use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown enrichment facet: {0} (expected git, files, or tokens)")]
    UnknownFacet(String),

    #[error("Backend error: {0}")]
    Client(#[from] ClientError),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No credentials for profile {0} (re-run `databricks auth login`)")]
    MissingCredentials(String),
}

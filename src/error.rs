use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("could not read kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("could not load in-cluster config: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pod watch did not sync within {0:?}")]
    SyncTimeout(Duration),

    #[error("watch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a Job could not be fetched.
#[derive(Error, Debug)]
pub enum JobLookupError {
    #[error("job {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("api error fetching job {namespace}/{name}: {source}")]
    Api {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("fetching job {namespace}/{name} timed out after {timeout:?}")]
    Timeout {
        namespace: String,
        name: String,
        timeout: Duration,
    },
}

impl JobLookupError {
    /// Short label for log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            JobLookupError::NotFound { .. } => "not_found",
            JobLookupError::Api { .. } => "api_error",
            JobLookupError::Timeout { .. } => "timeout",
        }
    }
}

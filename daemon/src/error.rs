use common::JobId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template name {0:?} has no letters or digits to name a file after")]
    InvalidTemplateName(String),

    #[error("Interval must be at least 1, got {0}")]
    InvalidInterval(u64),

    #[error("Unsupported script type: {0}")]
    UnsupportedScriptType(String),

    #[error("{0}")]
    ProcessSpawn(#[source] std::io::Error),

    #[error("Failed to {action} {path:?}: {source}")]
    Persistence {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SchedError {
    pub fn persistence(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchedError::Persistence {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedError>;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config file {path:?}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("invalid stack name {name:?}\n{reason}")]
    StackName { name: String, reason: String },

    #[error("validation failed on resource '{resource}'\n{reason}")]
    Validation { resource: String, reason: String },

    #[error("audit failed: {}", .failures.join("; "))]
    Audit { failures: Vec<String> },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("access denied from {url}: the bucket policy condition does not match the distribution")]
    AccessDenied { url: String },

    #[error("endpoint probe of {url} failed: {reason}")]
    Probe { url: String, reason: String },
}

impl StackError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StackError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        StackError::Validation {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = StackError> = std::result::Result<T, E>;

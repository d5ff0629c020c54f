use crate::validation::AggregatedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaGateError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Validation(#[from] AggregatedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SchemaGateError {
    /// The aggregated issues, if this is a validation failure.
    pub fn validation(&self) -> Option<&AggregatedError> {
        match self {
            SchemaGateError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaGateError>;

use thiserror::Error;

use crate::common::error::AurigaError::{ConfigurationError, NotFoundError, ValidationError};

#[derive(Debug, Error)]
pub enum AurigaError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Cannot reach PBS server '{server}' of {cluster}: {message}")]
    SchedulerConnectionError {
        server: String,
        cluster: String,
        message: String,
    },
    #[error("{0}")]
    NotFoundError(String),
    #[error("No cluster definitions found in {0}")]
    NoClusterAvailable(String),
}

impl From<serde_yaml::Error> for AurigaError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigurationError(e.to_string())
    }
}

impl From<serde_json::error::Error> for AurigaError {
    fn from(e: serde_json::error::Error) -> Self {
        ConfigurationError(e.to_string())
    }
}

pub fn config_error<T>(message: String) -> crate::Result<T> {
    Err(ConfigurationError(message))
}

pub fn validation_error<T>(message: String) -> crate::Result<T> {
    Err(ValidationError(message))
}

pub fn not_found<T>(message: String) -> crate::Result<T> {
    Err(NotFoundError(message))
}

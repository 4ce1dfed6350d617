//! Cloud provisioning error types

use std::time::Duration;
use thiserror::Error;

/// Cloud provisioning errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid port spec: {0}")]
    InvalidPortSpec(String),

    #[error("Missing required attribute: please provide :{0} attribute")]
    MissingRequiredAttribute(&'static str),

    #[error(
        "Unsupported region '{0}': no default image is mapped, please provide an explicit image_id"
    )]
    UnsupportedRegion(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Server {server_id} was not ready after {waited:?}")]
    BootstrapTimeout { server_id: String, waited: Duration },

    #[error("Unknown flavor '{0}'")]
    UnknownFlavor(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Build a gateway error tagged with the operation that failed
    pub fn gateway(operation: &str, message: impl std::fmt::Display) -> Self {
        Self::Gateway(format!("{}: {}", operation, message))
    }

    /// True when the provider rejected a create because the resource exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::ResourceAlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

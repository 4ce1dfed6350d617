//! EC2 gateway error types

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use outpost_cloud::CloudError;
use std::fmt::Debug;
use thiserror::Error;

/// Provider error codes meaning "a create raced with an existing resource"
const DUPLICATE_CODES: &[&str] = &[
    "InvalidGroup.Duplicate",
    "InvalidPermission.Duplicate",
    "InvalidKeyPair.Duplicate",
];

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Incomplete credentials: {0} is set but {1} is missing")]
    IncompleteCredentials(&'static str, &'static str),

    #[error("{operation} response did not include {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Server {0} has no public address to connect to")]
    NoPublicAddress(String),

    #[error("sshd on {host} was not reachable after {attempts} attempts")]
    SshUnavailable { host: String, attempts: u32 },

    #[error("Remote command failed on {host}: {stderr}")]
    RemoteCommandFailed { host: String, stderr: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::SshUnavailable { .. } | AwsError::RemoteCommandFailed { .. } => {
                CloudError::CommandFailed(err.to_string())
            }
            other => CloudError::Gateway(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Classify an SDK failure into the provider-neutral error vocabulary
pub(crate) fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    match err.code() {
        Some(code) if DUPLICATE_CODES.contains(&code) => {
            CloudError::ResourceAlreadyExists(format!("{}: {}", operation, code))
        }
        Some(code) if code.ends_with(".NotFound") => {
            CloudError::ResourceNotFound(format!("{}: {}", operation, code))
        }
        _ => CloudError::gateway(operation, DisplayErrorContext(&err)),
    }
}

/// `.send().await.or_gateway("op")?` for SDK results
pub(crate) trait SdkResultExt<T> {
    fn or_gateway(self, operation: &str) -> outpost_cloud::Result<T>;
}

impl<T, E, R> SdkResultExt<T> for std::result::Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn or_gateway(self, operation: &str) -> outpost_cloud::Result<T> {
        self.map_err(|e| classify(operation, e))
    }
}

/// Turn a "not found" lookup failure into `None`
pub(crate) fn absent_if_not_found<T>(
    result: outpost_cloud::Result<T>,
) -> outpost_cloud::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CloudError::ResourceNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

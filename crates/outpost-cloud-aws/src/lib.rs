//! EC2 compute gateway for Outpost
//!
//! Implements [`outpost_cloud::ComputeGateway`] with the AWS SDK. Provider
//! errors are classified into the shared [`outpost_cloud::CloudError`]
//! vocabulary; post-boot setup runs over the system `ssh` client.

mod convert;
pub mod error;
pub mod gateway;
pub mod ssh;

pub use error::{AwsError, Result};
pub use gateway::{ACCESS_KEY_ID, Ec2Gateway, SECRET_ACCESS_KEY, SESSION_TOKEN};
pub use ssh::RemoteShell;

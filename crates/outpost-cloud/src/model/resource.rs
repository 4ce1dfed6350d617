//! Addresses, volumes and key pairs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an elastic address may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressDomain {
    #[default]
    Standard,
    Vpc,
}

impl fmt::Display for AddressDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Vpc => write!(f, "vpc"),
        }
    }
}

/// Elastic (stable, reassignable) public address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub public_ip: String,
    pub allocation_id: Option<String>,
    pub domain: AddressDomain,

    /// Instance the address is bound to
    pub server_id: Option<String>,
}

impl Address {
    pub fn is_attached(&self) -> bool {
        self.server_id.is_some()
    }
}

/// Block volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: Option<String>,
    pub size_gb: i32,
    pub availability_zone: String,
    pub device: Option<String>,
    pub server_id: Option<String>,
}

/// Parameters for creating a block volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRequest {
    pub name: String,
    pub size_gb: i32,
    pub availability_zone: String,
}

/// Registered SSH key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub fingerprint: Option<String>,
}

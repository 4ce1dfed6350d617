//! Compute instance model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    #[default]
    Unknown,
}

impl ServerState {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute instance as seen through the gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub state: ServerState,

    /// Security group names; the first one is the primary group
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub group_ids: Vec<String>,

    pub public_ip: Option<String>,
    pub dns_name: Option<String>,
    pub availability_zone: Option<String>,
    pub image_id: Option<String>,
    pub flavor_id: Option<String>,
    pub key_name: Option<String>,
    pub subnet_id: Option<String>,
    pub launched_at: Option<DateTime<Utc>>,
}

impl Server {
    /// True once the instance reports running
    pub fn is_ready(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Host to reach the instance at, preferring the public address
    pub fn host(&self) -> Option<&str> {
        self.public_ip.as_deref().or(self.dns_name.as_deref())
    }

    pub fn in_group(&self, name: &str, group_id: &str) -> bool {
        self.groups.iter().any(|g| g == name) || self.group_ids.iter().any(|g| g == group_id)
    }
}

/// Attributes submitted with an instance creation call
///
/// Local control-plane data such as the private key path never appears here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerAttributes {
    pub image_id: String,
    pub key_name: String,
    pub name: Option<String>,
    pub flavor_id: Option<String>,
    pub subnet_id: Option<String>,
    pub availability_zone: Option<String>,
    pub groups: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl ServerAttributes {
    /// VPC mode is signalled by the presence of a subnet
    pub fn is_vpc(&self) -> bool {
        self.subnet_id.is_some()
    }
}

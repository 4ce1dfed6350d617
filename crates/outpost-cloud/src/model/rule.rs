//! Ingress rule definitions

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CIDR matching every IPv4 address
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Protocol of an ingress rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// Parse a protocol name, case-insensitively
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            other => Err(CloudError::InvalidPortSpec(format!(
                "unrecognized protocol '{}' (expected tcp, udp or icmp)",
                other
            ))),
        }
    }

    /// Name used by the remote API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive port range
///
/// Ports are `i32` because the remote API encodes "every ICMP type" as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub from: i32,
    pub to: i32,
}

impl PortRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: i32, to: i32) -> Result<Self> {
        if from > to {
            return Err(CloudError::InvalidPortSpec(format!(
                "port range {}..{} has min greater than max",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Range containing a single port
    pub fn single(port: i32) -> Self {
        Self {
            from: port,
            to: port,
        }
    }

    /// True when this range fully contains `other`
    pub fn covers(&self, other: &PortRange) -> bool {
        self.from <= other.from && self.to >= other.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// One desired ingress rule after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Label, unique within a request
    pub name: String,

    pub protocol: Protocol,

    pub port_range: PortRange,

    /// Permitted source CIDRs, never empty
    pub ip_ranges: Vec<String>,
}

impl PortSpec {
    /// TCP rule open to every IPv4 address
    pub fn tcp(name: impl Into<String>, port_range: PortRange) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Tcp,
            port_range,
            ip_ranges: vec![ANY_IPV4.to_string()],
        }
    }

    /// One grant per source CIDR
    pub fn grants(&self) -> impl Iterator<Item = IngressGrant> + '_ {
        self.ip_ranges.iter().map(|cidr| IngressGrant {
            protocol: self.protocol,
            port_range: self.port_range,
            cidr: cidr.clone(),
        })
    }
}

/// A rule already present on a remote security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRule {
    /// Raw protocol as reported by the provider ("tcp", "udp", "icmp", "-1")
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub ip_ranges: Vec<String>,
}

impl LiveRule {
    /// True when this rule already authorizes everything `grant` asks for
    pub fn covers(&self, grant: &IngressGrant) -> bool {
        self.protocol == grant.protocol.as_str()
            && self.ip_ranges.iter().any(|cidr| *cidr == grant.cidr)
            && self.from_port <= grant.port_range.from
            && self.to_port >= grant.port_range.to
    }
}

impl From<&IngressGrant> for LiveRule {
    fn from(grant: &IngressGrant) -> Self {
        Self {
            protocol: grant.protocol.as_str().to_string(),
            from_port: grant.port_range.from,
            to_port: grant.port_range.to,
            ip_ranges: vec![grant.cidr.clone()],
        }
    }
}

/// A single authorize request: one protocol, one range, one source CIDR
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressGrant {
    pub protocol: Protocol,
    pub port_range: PortRange,
    pub cidr: String,
}

impl IngressGrant {
    pub fn new(protocol: Protocol, port_range: PortRange, cidr: impl Into<String>) -> Self {
        Self {
            protocol,
            port_range,
            cidr: cidr.into(),
        }
    }

    /// The secure-access rule every non-VPC server needs: tcp/22 from anywhere
    pub fn ssh_from_anywhere() -> Self {
        Self::new(Protocol::Tcp, PortRange::single(22), ANY_IPV4)
    }
}

/// Remote security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub name: String,
    pub group_id: String,
    pub description: String,
    pub vpc_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("UDP").unwrap(), Protocol::Udp);
        assert_eq!(Protocol::parse("icmp").unwrap(), Protocol::Icmp);
        assert!(matches!(
            Protocol::parse("rdp"),
            Err(CloudError::InvalidPortSpec(_))
        ));
    }

    #[test]
    fn test_port_range_rejects_inverted() {
        assert!(PortRange::new(80, 82).is_ok());
        assert!(PortRange::new(82, 80).is_err());
    }

    #[test]
    fn test_live_rule_covers_narrower_grant() {
        let live = LiveRule {
            protocol: "tcp".to_string(),
            from_port: 80,
            to_port: 90,
            ip_ranges: vec!["10.0.0.0/8".to_string(), ANY_IPV4.to_string()],
        };

        let inside = IngressGrant::new(Protocol::Tcp, PortRange::new(81, 85).unwrap(), ANY_IPV4);
        let overlapping =
            IngressGrant::new(Protocol::Tcp, PortRange::new(85, 95).unwrap(), ANY_IPV4);
        let other_cidr =
            IngressGrant::new(Protocol::Tcp, PortRange::single(80), "192.168.0.0/16");
        let other_protocol = IngressGrant::new(Protocol::Udp, PortRange::single(80), ANY_IPV4);

        assert!(live.covers(&inside));
        assert!(!live.covers(&overlapping));
        assert!(!live.covers(&other_cidr));
        assert!(!live.covers(&other_protocol));
    }
}

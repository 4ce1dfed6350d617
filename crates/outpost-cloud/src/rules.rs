//! Desired-port normalization
//!
//! Callers describe the ports they want opened as a mapping keyed by rule
//! name. Each entry is either a bare port (or range), meaning TCP from any
//! address, or a detailed record:
//!
//! ```yaml
//! ssh: 22
//! http: { ports: "80..82" }
//! mosh: { protocol: udp, ports: "60000..60050" }
//! rdp: { ports: 3398, ip_ranges: [ { cidr: "196.212.12.34/32" } ] }
//! ```
//!
//! [`normalize`] turns that description into canonical [`PortSpec`]s, in the
//! order the entries were written.

use crate::error::{CloudError, Result};
use crate::model::{ANY_IPV4, PortRange, PortSpec, Protocol};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// Ordered mapping of rule name to port definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortMap {
    entries: Vec<(String, PortDefinition)>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any previous definition with the same name
    pub fn insert(&mut self, name: impl Into<String>, definition: PortDefinition) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = definition,
            None => self.entries.push((name, definition)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, definition: PortDefinition) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PortDefinition)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for PortMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PortMapVisitor;

        impl<'de> Visitor<'de> for PortMapVisitor {
            type Value = PortMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of rule name to port definition")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<PortMap, A::Error> {
                let mut map = PortMap::new();
                while let Some((name, definition)) =
                    access.next_entry::<String, PortDefinition>()?
                {
                    if map.entries.iter().any(|(n, _)| *n == name) {
                        return Err(de::Error::custom(format!(
                            "duplicate port rule name '{}'",
                            name
                        )));
                    }
                    map.entries.push((name, definition));
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(PortMapVisitor)
    }
}

/// One entry of a desired-ports description
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortDefinition {
    /// Bare port or range: TCP from anywhere
    Simple(PortValue),
    Detailed(DetailedPort),
}

impl PortDefinition {
    pub fn port(port: i64) -> Self {
        Self::Simple(PortValue::Single(port))
    }

    pub fn range(min: i64, max: i64) -> Self {
        Self::Simple(PortValue::Bounds { min, max })
    }
}

/// Structured port definition
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedPort {
    #[serde(default)]
    pub protocol: Option<String>,

    pub ports: PortValue,

    #[serde(default, alias = "ipRanges")]
    pub ip_ranges: Option<Vec<CidrRecord>>,
}

/// CIDR-bearing record inside `ip_ranges`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CidrRecord {
    #[serde(alias = "cidr_ip", alias = "cidrIp")]
    pub cidr: String,
}

impl CidrRecord {
    pub fn new(cidr: impl Into<String>) -> Self {
        Self { cidr: cidr.into() }
    }
}

/// A port or an inclusive port range, in any of the accepted spellings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    /// `22`
    Single(i64),
    /// `{ min: 80, max: 82 }`
    Bounds { min: i64, max: i64 },
    /// `[80, 82]`
    Pair(Vec<i64>),
    /// `"80..82"`, `"80-82"` or `"22"`
    Text(String),
}

impl Default for PortValue {
    fn default() -> Self {
        Self::Single(0)
    }
}

impl PortValue {
    /// Resolve to a validated range
    pub fn to_range(&self) -> Result<PortRange> {
        match self {
            Self::Single(port) => Ok(PortRange::single(to_port(*port)?)),
            Self::Bounds { min, max } => PortRange::new(to_port(*min)?, to_port(*max)?),
            Self::Pair(bounds) => match bounds.as_slice() {
                [port] => Ok(PortRange::single(to_port(*port)?)),
                [min, max] => PortRange::new(to_port(*min)?, to_port(*max)?),
                _ => Err(CloudError::InvalidPortSpec(format!(
                    "port range needs one or two bounds, got {}",
                    bounds.len()
                ))),
            },
            Self::Text(text) => parse_range_text(text),
        }
    }
}

fn to_port(value: i64) -> Result<i32> {
    i32::try_from(value)
        .ok()
        .filter(|port| (-1..=65535).contains(port))
        .ok_or_else(|| CloudError::InvalidPortSpec(format!("port {} is out of range", value)))
}

fn parse_bound(text: &str, original: &str) -> Result<i32> {
    let value = text.trim().parse::<i64>().map_err(|_| {
        CloudError::InvalidPortSpec(format!("cannot parse port range '{}'", original))
    })?;
    to_port(value)
}

fn parse_range_text(text: &str) -> Result<PortRange> {
    let trimmed = text.trim();
    if let Ok(port) = trimmed.parse::<i64>() {
        return Ok(PortRange::single(to_port(port)?));
    }
    let (min, max) = trimmed
        .split_once("..")
        .or_else(|| trimmed.split_once('-'))
        .ok_or_else(|| {
            CloudError::InvalidPortSpec(format!("cannot parse port range '{}'", text))
        })?;
    PortRange::new(parse_bound(min, text)?, parse_bound(max, text)?)
}

/// Canonicalize a desired-ports description
///
/// Fails with `InvalidPortSpec` on a malformed range or unknown protocol.
pub fn normalize(ports: &PortMap) -> Result<Vec<PortSpec>> {
    ports
        .iter()
        .map(|(name, definition)| normalize_entry(name, definition))
        .collect()
}

fn normalize_entry(name: &str, definition: &PortDefinition) -> Result<PortSpec> {
    let with_name = |e: CloudError| match e {
        CloudError::InvalidPortSpec(msg) => {
            CloudError::InvalidPortSpec(format!("rule '{}': {}", name, msg))
        }
        other => other,
    };

    match definition {
        PortDefinition::Simple(value) => {
            let range = value.to_range().map_err(with_name)?;
            Ok(PortSpec::tcp(name, range))
        }
        PortDefinition::Detailed(detail) => {
            let protocol = match detail.protocol.as_deref() {
                Some(p) => Protocol::parse(p).map_err(with_name)?,
                None => Protocol::default(),
            };
            let port_range = detail.ports.to_range().map_err(with_name)?;
            let ip_ranges = match &detail.ip_ranges {
                Some(records) if !records.is_empty() => {
                    records.iter().map(|r| r.cidr.clone()).collect()
                }
                _ => vec![ANY_IPV4.to_string()],
            };
            Ok(PortSpec {
                name: name.to_string(),
                protocol,
                port_range,
                ip_ranges,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_port_is_tcp_from_anywhere() {
        let ports = PortMap::new().with("ssh", PortDefinition::port(22));
        let specs = normalize(&ports).unwrap();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "ssh");
        assert_eq!(specs[0].protocol, Protocol::Tcp);
        assert_eq!(specs[0].port_range, PortRange::single(22));
        assert_eq!(specs[0].ip_ranges, vec!["0.0.0.0/0".to_string()]);
    }

    #[test]
    fn test_detailed_udp_range() {
        let ports: PortMap =
            serde_json::from_str(r#"{"mosh": {"protocol": "udp", "ports": "60000..60050"}}"#)
                .unwrap();
        let specs = normalize(&ports).unwrap();

        assert_eq!(specs[0].protocol, Protocol::Udp);
        assert_eq!(specs[0].port_range, PortRange::new(60000, 60050).unwrap());
        assert_eq!(specs[0].ip_ranges, vec![ANY_IPV4.to_string()]);
    }

    #[test]
    fn test_explicit_ip_ranges() {
        let ports: PortMap = serde_json::from_str(
            r#"{"rdp": {"ports": 3398, "ip_ranges": [{"cidrIp": "196.212.12.34/32"}, {"cidr": "10.0.0.0/8"}]}}"#,
        )
        .unwrap();
        let specs = normalize(&ports).unwrap();

        assert_eq!(
            specs[0].ip_ranges,
            vec!["196.212.12.34/32".to_string(), "10.0.0.0/8".to_string()]
        );
        assert_eq!(specs[0].grants().count(), 2);
    }

    #[test]
    fn test_preserves_input_order() {
        let ports: PortMap = serde_json::from_str(
            r#"{"ssh": 22, "https": 443, "http": {"ports": [80, 82]}, "dns": {"protocol": "udp", "ports": 53}}"#,
        )
        .unwrap();
        let names: Vec<String> = normalize(&ports)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert_eq!(names, vec!["ssh", "https", "http", "dns"]);
    }

    #[test]
    fn test_range_spellings() {
        for text in ["80..82", "80-82", " 80 .. 82 "] {
            assert_eq!(
                PortValue::Text(text.to_string()).to_range().unwrap(),
                PortRange::new(80, 82).unwrap()
            );
        }
        assert_eq!(
            PortValue::Bounds { min: 1, max: 2 }.to_range().unwrap(),
            PortRange::new(1, 2).unwrap()
        );
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let ports = PortMap::new().with("bad", PortDefinition::range(90, 80));
        let err = normalize(&ports).unwrap_err();
        assert!(matches!(err, CloudError::InvalidPortSpec(ref m) if m.contains("bad")));
    }

    #[test]
    fn test_unknown_protocol_is_rejected() {
        let ports: PortMap =
            serde_json::from_str(r#"{"rdp": {"protocol": "rdp", "ports": 3398}}"#).unwrap();
        assert!(matches!(
            normalize(&ports),
            Err(CloudError::InvalidPortSpec(_))
        ));
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let ports = PortMap::new().with("huge", PortDefinition::port(70000));
        assert!(normalize(&ports).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected_on_load() {
        let result: std::result::Result<PortMap, _> =
            serde_json::from_str(r#"{"ssh": 22, "ssh": 2222}"#);
        assert!(result.is_err());
    }
}

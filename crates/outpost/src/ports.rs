//! Port definition files

use anyhow::Context;
use outpost_cloud::{PortMap, PortSpec, normalize};
use std::path::Path;

/// Read a YAML port map and normalize it into rule specs
///
/// ```yaml
/// ssh: 22
/// mosh:
///   protocol: udp
///   ports: 60000..60050
/// ```
pub fn load(path: &Path) -> anyhow::Result<Vec<PortSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read port file {}", path.display()))?;
    let map: PortMap = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid port file {}", path.display()))?;
    Ok(normalize(&map)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_cloud::Protocol;

    #[test]
    fn test_load_port_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.yml");
        std::fs::write(
            &path,
            "ssh: 22\nmosh:\n  protocol: udp\n  ports: 60000..60050\n",
        )
        .unwrap();

        let specs = load(&path).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "ssh");
        assert_eq!(specs[1].protocol, Protocol::Udp);
        assert_eq!(specs[1].port_range.to, 60050);
    }

    #[test]
    fn test_missing_port_file() {
        let err = load(Path::new("/nonexistent/ports.yml")).unwrap_err();
        assert!(err.to_string().contains("failed to read port file"));
    }
}

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file directly
pub const CONFIG_PATH_ENV: &str = "OUTPOST_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "outpost.local.yml",
    ".outpost.local.yml",
    "outpost.yml",
    ".outpost.yml",
];

/// Credentials and region handed to a compute gateway
///
/// ```yaml
/// region: us-east-1
/// credentials:
///   aws_access_key_id: AKIA...
///   aws_secret_access_key: ...
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,

    #[serde(default)]
    pub region: String,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            credentials: BTreeMap::new(),
            region: region.into(),
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).map(String::as_str)
    }

    /// Parse YAML text; `origin` only labels errors
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        if config.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion(origin.to_path_buf()));
        }

        Ok(config)
    }
}

/// Outpost's configuration directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("outpost");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the provider configuration file
///
/// Search order:
/// 1. `OUTPOST_CONFIG_PATH`
/// 2. current directory: outpost.local.yml, .outpost.local.yml, outpost.yml, .outpost.yml
/// 3. the same names inside ./.outpost/
/// 4. ~/.config/outpost/config.yml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::debug!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let outpost_dir = current_dir.join(".outpost");
    if outpost_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = outpost_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("outpost").join("config.yml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Read and validate a configuration file
pub fn load(path: &Path) -> Result<ProviderConfig> {
    let text = std::fs::read_to_string(path)?;
    let config = ProviderConfig::from_yaml(&text, path)?;
    tracing::debug!("loaded provider configuration from {}", path.display());
    Ok(config)
}

/// [`find_config_file`] followed by [`load`]
pub fn load_default() -> Result<ProviderConfig> {
    load(&find_config_file()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SAMPLE: &str = r#"
region: us-west-2
credentials:
  aws_access_key_id: AKIAEXAMPLE
  aws_secret_access_key: secret
"#;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("outpost"));
        assert!(config_dir.exists());
    }

    #[test]
    fn test_parse_config() {
        let config = ProviderConfig::from_yaml(SAMPLE, Path::new("outpost.yml")).unwrap();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.credential("aws_access_key_id"), Some("AKIAEXAMPLE"));
        assert_eq!(config.credential("aws_session_token"), None);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = ProviderConfig::from_yaml(
            "region: us-east-1\nprovider: aws\n",
            Path::new("outpost.yml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("outpost.yml"));
    }

    #[test]
    fn test_missing_region() {
        let err = ProviderConfig::from_yaml("credentials: {}\n", Path::new("outpost.yml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRegion(_)));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("outpost.yml"), SAMPLE).unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("outpost.yml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("outpost.yml"), SAMPLE).unwrap();
        fs::write(temp_dir.path().join("outpost.local.yml"), SAMPLE).unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with("outpost.local.yml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_outpost_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let outpost_dir = temp_dir.path().join(".outpost");
        fs::create_dir(&outpost_dir).unwrap();
        fs::write(outpost_dir.join("outpost.yml"), SAMPLE).unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().ends_with(".outpost/outpost.yml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("elsewhere.yml");
        fs::write(&custom, SAMPLE).unwrap();

        // SAFETY: tests touching the environment are serialized
        unsafe { std::env::set_var(CONFIG_PATH_ENV, &custom) };
        let result = find_config_file();
        unsafe { std::env::remove_var(CONFIG_PATH_ENV) };

        assert_eq!(result.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outpost.yml");
        fs::write(&path, SAMPLE).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.region, "us-west-2");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load(Path::new("/nonexistent/outpost.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

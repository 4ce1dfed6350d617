use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Configuration file not found. Looked in:\n\
        - current directory: outpost.local.yml, .outpost.local.yml, outpost.yml, .outpost.yml\n\
        - ./.outpost/ directory\n\
        - ~/.config/outpost/config.yml\n\
        Set OUTPOST_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Invalid configuration in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Configuration in {0} does not name a region")]
    MissingRegion(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

use std::path::PathBuf;

use net::NetError;
use registry::RegistryError;
use thiserror::Error;

/// Problems with a component's configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mandatory configuration parameter {0} is missing")]
    MissingParameter(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("unable to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("channel {0} was never declared")]
    UndeclaredChannel(String),
    #[error("component is {actual:?}, expected {expected:?}")]
    Lifecycle {
        expected: crate::Lifecycle,
        actual: crate::Lifecycle,
    },
    #[error("setup failed: {0}")]
    Setup(String),
}

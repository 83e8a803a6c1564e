use std::path::PathBuf;

use net::NetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("unable to read machine list {path}: {source}")]
    MachineList {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid machine list: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("name service must be addressed by an IPv4 literal, got {0}")]
    NameServiceAddress(String),
    #[error("unable to resolve {0}")]
    Unresolved(String),
    #[error("topic registry refused {0}")]
    Refused(String),
}

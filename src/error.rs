use crate::host::HostError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("failed to access preference file {path:?}: {source}")]
    PreferenceIo { path: PathBuf, source: std::io::Error },

    #[error("malformed preference file {path:?}: {source}")]
    PreferenceFormat { path: PathBuf, source: serde_json::Error },

    #[error("failed to encode control message: {0}")]
    Encode(#[from] serde_json::Error),
}

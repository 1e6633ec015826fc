//! Registry error types.

use std::path::PathBuf;

/// Errors that can occur during registry operations.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// The application list could not be read.
    #[error("Failed to read application list {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The application list is malformed.
    #[error("Failed to parse application list {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The application list could not be encoded.
    #[error("Failed to encode application list: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The application list or its backup could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Refused to save an empty list.
    #[error("There are no applications to save")]
    Empty,

    /// An index does not address an entry.
    #[error("No application at index {index} (registry has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

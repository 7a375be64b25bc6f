//! Delivering a finished file onto removable media
//!
//! Only plain directory copies are handled; the destination is whatever
//! directory the media is mounted at.

mod delivery;

pub use delivery::copy_to_media;

use std::path::PathBuf;

/// Errors from copying to or verifying on the destination media
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("destination is not a directory: {0}")]
    DestinationMissing(PathBuf),

    #[error("copied file not found: {0}")]
    TargetMissing(PathBuf),

    #[error("size mismatch for {path}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MediaError::Io {
            context: context.into(),
            source,
        }
    }
}

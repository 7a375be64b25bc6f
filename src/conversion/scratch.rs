//! Scoped scratch space for a single job
//!
//! Everything a job creates besides the final file (concat list, trimmed
//! segment, staged output) lives in one temporary directory next to the
//! output. The directory is removed when the `ScratchSpace` is dropped, so
//! success, failure and cancellation all clean up the same way.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::audio::AudioFormat;
use crate::error::ExecutionError;

const SCRATCH_PREFIX: &str = ".audio-repeater-";

pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// Create scratch space in the output's directory
    ///
    /// Staging beside the destination keeps the final rename on one filesystem.
    pub fn create_next_to(output: &Path) -> Result<Self, ExecutionError> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| {
                ExecutionError::io(
                    &format!("Failed to create scratch directory in {}", parent.display()),
                    e,
                )
            })?;

        log::debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Where the output is written before it is moved into place
    pub fn staged_output(&self, format: AudioFormat) -> PathBuf {
        self.file(&format!("output.{}", format.extension()))
    }

    /// Move the staged file onto `destination`, then remove the scratch space
    pub fn commit(self, staged: &Path, destination: &Path) -> Result<(), ExecutionError> {
        fs::rename(staged, destination).map_err(|e| {
            ExecutionError::io(
                &format!("Failed to move output into {}", destination.display()),
                e,
            )
        })?;
        self.close();
        Ok(())
    }

    /// Remove the scratch space, reporting rather than ignoring failures
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            log::warn!("Failed to remove scratch directory {}: {}", path.display(), e);
        }
    }
}

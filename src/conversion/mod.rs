//! Concatenation engine
//!
//! Chooses a strategy and produces the repeated file, either through ffmpeg
//! or with the in-process WAV concatenator.

mod cancel;
pub mod executor;
pub mod ffmpeg;
mod scratch;
pub mod strategy;
pub mod wav;

pub use cancel::CancelToken;
pub use executor::{execute, ExecutionContext};
pub use strategy::{select, ConcatStrategy};

use std::path::{Path, PathBuf};

/// Whether the external media tool can be used for this process
///
/// Computed once at startup and passed down; never re-queried mid-job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCapability {
    Available { path: PathBuf },
    Unavailable,
}

impl ToolCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolCapability::Available { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ToolCapability::Available { path } => Some(path),
            ToolCapability::Unavailable => None,
        }
    }
}

fn ffmpeg_file_name() -> &'static str {
    if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" }
}

/// Locate ffmpeg
///
/// Search order: explicit override, next to the executable (also its
/// `resources/bin/`), the current directory, then every `PATH` entry.
/// An override that fails verification is reported and discovery continues.
pub fn locate_ffmpeg(override_path: Option<&Path>) -> ToolCapability {
    if let Some(path) = override_path {
        match verify_ffmpeg(path) {
            Ok(path) => {
                log::debug!("Using configured ffmpeg at {}", path.display());
                return ToolCapability::Available { path };
            }
            Err(e) => log::warn!("Ignoring configured ffmpeg: {}", e),
        }
    }

    let name = ffmpeg_file_name();
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        dirs.push(exe_dir.to_path_buf());
        dirs.push(exe_dir.join("resources").join("bin"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(path_var) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path_var));
    }

    match find_in_dirs(name, dirs) {
        Some(path) => {
            log::debug!("Found ffmpeg at {}", path.display());
            ToolCapability::Available { path }
        }
        None => {
            log::debug!("ffmpeg not found; only WAV is supported");
            ToolCapability::Unavailable
        }
    }
}

/// First directory containing a usable binary called `name`
fn find_in_dirs(name: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.into_iter()
        .map(|dir| dir.join(name))
        .find_map(|candidate| verify_ffmpeg(&candidate).ok())
}

/// Verify that ffmpeg exists and is executable
pub fn verify_ffmpeg(path: &Path) -> Result<PathBuf, String> {
    if !path.is_file() {
        return Err(format!("ffmpeg not found at {:?}", path));
    }

    // On Unix, check if executable
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)
            .map_err(|e| format!("Failed to get ffmpeg metadata: {}", e))?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(format!("ffmpeg at {:?} is not executable", path));
        }
    }

    Ok(path.to_path_buf())
}

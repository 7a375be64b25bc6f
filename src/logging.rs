//! Logging configuration for Audio Repeater
//!
//! Logs go to the terminal and to a file at:
//! - macOS: `~/Library/Logs/Audio Repeater/audio-repeater.log`
//! - elsewhere: `<local data dir>/audio-repeater/logs/audio-repeater.log`
//!
//! The file always captures debug output, so it can be attached to bug
//! reports even when the terminal only showed progress.

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_FILE_NAME: &str = "audio-repeater.log";

/// Logs larger than this are moved aside at startup
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Get the log directory path
pub fn get_log_directory() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Logs").join("Audio Repeater"))
    } else {
        dirs::data_local_dir().map(|d| d.join("audio-repeater").join("logs"))
    }
}

/// Get the current log file path
pub fn get_log_file_path() -> Option<PathBuf> {
    get_log_directory().map(|d| d.join(LOG_FILE_NAME))
}

/// Move `log_path` to `<name>.old` if it has grown past `max_bytes`
///
/// Returns true when the file was rotated.
fn rotate_if_large(log_path: &Path, max_bytes: u64) -> bool {
    let Ok(metadata) = fs::metadata(log_path) else {
        return false;
    };
    if metadata.len() <= max_bytes {
        return false;
    }
    let backup_path = log_path.with_extension("log.old");
    fs::rename(log_path, backup_path).is_ok()
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build()
}

fn terminal_level(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Info }
}

/// Initialize the logging system
///
/// Returns the path to the log file when file logging could be set up.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    let Some(log_dir) = get_log_directory() else {
        eprintln!("Warning: Could not determine log directory");
        init_terminal_only(verbose);
        return None;
    };

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_terminal_only(verbose);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_if_large(&log_path, MAX_LOG_BYTES);

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            init_terminal_only(verbose);
            return None;
        }
    };

    let config = log_config();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            terminal_level(verbose),
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, config, log_file),
    ];

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    log::debug!("=== Audio Repeater session started ===");
    log::debug!("Log file: {}", log_path.display());

    Some(log_path)
}

/// Terminal-only logging, used when the log file is unavailable
fn init_terminal_only(verbose: bool) {
    let term_logger = TermLogger::new(
        terminal_level(verbose),
        log_config(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    let _ = CombinedLogger::init(vec![term_logger]);
}

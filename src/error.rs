//! Error types for repeat planning and concatenation
//!
//! Planning and selection errors are raised before any output is touched.
//! Execution errors carry a classified kind plus whatever the external tool
//! printed, so callers can decide how to report or retry.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::audio::AudioFormat;

/// Errors that can occur while building a repeated audio file.
#[derive(Debug, thiserror::Error)]
pub enum RepeatError {
    /// Source duration was zero, negative or not a number.
    #[error("source duration must be positive, got {0}s")]
    InvalidDuration(f64),

    /// Target duration was zero, negative or not a number.
    #[error("target duration must be positive, got {0}s")]
    InvalidTarget(f64),

    /// No concatenation path exists for this pair of formats.
    #[error("cannot produce {to} from {from}: {reason}")]
    UnsupportedConversion {
        from: AudioFormat,
        to: AudioFormat,
        reason: &'static str,
    },

    /// Output format tag is not one we know how to write.
    #[error("unsupported output format '{0}'")]
    UnknownOutputFormat(String),

    /// The source could not be probed.
    #[error("unreadable audio file '{path}': {reason}")]
    UnreadableFile { path: PathBuf, reason: String },

    /// WAV header fields are missing or contradict each other.
    #[error("malformed WAV header: {0}")]
    MalformedHeader(String),

    /// Failure while producing the output file.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl RepeatError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        RepeatError::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Execution kind, if this error came from the execution stage
    pub fn execution_kind(&self) -> Option<ExecutionErrorKind> {
        match self {
            RepeatError::Execution(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Classification of execution-stage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// ffmpeg missing, crashed, timed out or exited non-zero
    ToolFailure,
    /// Output or scratch path could not be written
    IoFailure,
    /// Cutting the trailing partial segment failed
    TrimFailure,
    /// Caller terminated the job
    Cancelled,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionErrorKind::ToolFailure => "tool failure",
            ExecutionErrorKind::IoFailure => "I/O failure",
            ExecutionErrorKind::TrimFailure => "trim failure",
            ExecutionErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error raised while executing a concatenation strategy
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
    /// Exit code of the external tool, when it ran to completion
    pub exit_code: Option<i32>,
    /// Tail of the tool's stderr
    pub diagnostics: Option<String>,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            diagnostics: None,
        }
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::new(ExecutionErrorKind::IoFailure, format!("{}: {}", context, err))
    }

    pub fn cancelled() -> Self {
        Self::new(ExecutionErrorKind::Cancelled, "job cancelled by caller")
    }

    /// Attach the exit status and captured stderr of a finished tool run
    pub fn with_tool_output(mut self, status: Option<ExitStatus>, stderr: &str) -> Self {
        self.exit_code = status.and_then(|s| s.code());
        let tail = stderr_tail(stderr, 5);
        if !tail.is_empty() {
            self.diagnostics = Some(tail);
        }
        self
    }
}

/// Last `lines` non-empty lines of a stderr capture
pub fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

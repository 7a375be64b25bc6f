use std::path::{Path, PathBuf};

use crate::audio::{AudioFormat, BasicTags, ProbedAudio};
use crate::error::RepeatError;

/// The file being repeated
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTrack {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub format: AudioFormat,
    pub tags: BasicTags,
}

impl SourceTrack {
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            duration_seconds,
            format,
            tags: BasicTags::default(),
        }
    }

    /// Build from a probe result
    pub fn from_probe(path: &Path, probed: ProbedAudio) -> Self {
        Self {
            tags: probed.tags,
            ..Self::new(path, probed.duration_seconds, probed.format)
        }
    }
}

/// Where and how the repeated file should be written
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub target_seconds: f64,
}

impl OutputSpec {
    pub fn new(
        path: impl Into<PathBuf>,
        format: AudioFormat,
        target_seconds: f64,
    ) -> Result<Self, RepeatError> {
        if !target_seconds.is_finite() || target_seconds <= 0.0 {
            return Err(RepeatError::InvalidTarget(target_seconds));
        }
        Ok(Self {
            path: path.into(),
            format,
            target_seconds,
        })
    }

    /// Build from a caller-supplied format tag such as "mp3"
    pub fn from_tag(
        path: impl Into<PathBuf>,
        format_tag: &str,
        target_seconds: f64,
    ) -> Result<Self, RepeatError> {
        let format = AudioFormat::from_tag(format_tag)
            .ok_or_else(|| RepeatError::UnknownOutputFormat(format_tag.to_string()))?;
        Self::new(path, format, target_seconds)
    }
}

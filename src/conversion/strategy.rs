//! Concatenation strategy selection

use crate::core::{OutputSpec, SourceTrack};
use crate::error::RepeatError;

/// How the repeated file gets produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStrategy {
    /// Same format in and out: ffmpeg joins the compressed streams (`-c copy`)
    StreamCopy,
    /// Format conversion: ffmpeg decodes the joined list and re-encodes it
    Reencode,
    /// WAV to WAV without ffmpeg: samples are copied in-process
    Raw,
}

impl ConcatStrategy {
    pub fn uses_tool(&self) -> bool {
        match self {
            ConcatStrategy::StreamCopy | ConcatStrategy::Reencode => true,
            ConcatStrategy::Raw => false,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ConcatStrategy::StreamCopy => "stream copy (lossless, ffmpeg)",
            ConcatStrategy::Reencode => "re-encode (ffmpeg)",
            ConcatStrategy::Raw => "raw WAV concatenation (built-in)",
        }
    }
}

/// Pick a concatenation strategy
///
/// Only inspects format tags and the tool capability flag, so identical
/// inputs always produce the same answer.
pub fn select(
    source: &SourceTrack,
    output: &OutputSpec,
    tool_available: bool,
) -> Result<ConcatStrategy, RepeatError> {
    let unsupported = |reason| RepeatError::UnsupportedConversion {
        from: source.format,
        to: output.format,
        reason,
    };

    if !output.format.is_supported_output() {
        return Err(unsupported("output format is not supported"));
    }

    if tool_available {
        if source.format == output.format {
            Ok(ConcatStrategy::StreamCopy)
        } else {
            Ok(ConcatStrategy::Reencode)
        }
    } else if source.format.is_uncompressed() && output.format.is_uncompressed() {
        Ok(ConcatStrategy::Raw)
    } else {
        Err(unsupported("ffmpeg is required for formats other than WAV"))
    }
}

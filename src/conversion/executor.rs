//! Strategy execution
//!
//! Runs a chosen `ConcatStrategy` against a plan and produces the output file.
//! All intermediate files live in a `ScratchSpace`; the output path is only
//! written by the final rename, so a failed or cancelled job never leaves a
//! partial file where the caller expects the result.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ffmpeg::{self, CodecMode};
use super::scratch::ScratchSpace;
use super::{wav, CancelToken, ConcatStrategy, ToolCapability};
use crate::audio::{self, AudioFormat};
use crate::core::{format_duration, AppSettings, OutputSpec, RepeatPlan, SourceTrack};
use crate::error::{ExecutionError, ExecutionErrorKind, RepeatError};

/// Output drift beyond this is reported after an ffmpeg run
pub const DURATION_TOLERANCE_SECS: f64 = 1.0;

/// Most entries a concat list may hold
pub const MAX_CONCAT_SEGMENTS: u64 = 100_000;

/// Everything a job needs besides its inputs
pub struct ExecutionContext<'a> {
    pub tool: &'a ToolCapability,
    pub settings: &'a AppSettings,
    pub cancel: &'a CancelToken,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(tool: &'a ToolCapability, settings: &'a AppSettings, cancel: &'a CancelToken) -> Self {
        Self {
            tool,
            settings,
            cancel,
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.settings.tool_timeout_secs.map(Duration::from_secs)
    }

    fn ffmpeg(&self) -> Result<&'a Path, ExecutionError> {
        self.tool.path().ok_or_else(|| {
            ExecutionError::new(ExecutionErrorKind::ToolFailure, "ffmpeg is not available")
        })
    }
}

/// Produce `output` from `source` following `plan`
///
/// Returns `RepeatError` rather than a bare `ExecutionError` because the raw
/// path can still discover a malformed WAV header while reading.
pub fn execute(
    strategy: ConcatStrategy,
    source: &SourceTrack,
    plan: &RepeatPlan,
    output: &OutputSpec,
    ctx: &ExecutionContext,
) -> Result<(), RepeatError> {
    log::info!(
        "Repeating {} -> {} ({} segments: {} full + {:.3}s partial, {})",
        source.path.display(),
        output.path.display(),
        plan.segment_count(),
        plan.full_repeats,
        plan.partial_seconds,
        strategy.describe()
    );

    match strategy {
        ConcatStrategy::StreamCopy => {
            let ffmpeg = ctx.ffmpeg()?;
            concat_with_tool(ffmpeg, &CodecMode::Copy, source, plan, output, ctx)
        }
        ConcatStrategy::Reencode => {
            let ffmpeg = ctx.ffmpeg()?;
            let mode = CodecMode::reencode(output.format, &ctx.settings.bitrate_arg()).ok_or(
                RepeatError::UnsupportedConversion {
                    from: source.format,
                    to: output.format,
                    reason: "no encoder for output format",
                },
            )?;
            concat_with_tool(ffmpeg, &mode, source, plan, output, ctx)
        }
        ConcatStrategy::Raw => concat_raw(source, plan, output, ctx),
    }
}

fn concat_with_tool(
    ffmpeg_path: &Path,
    mode: &CodecMode,
    source: &SourceTrack,
    plan: &RepeatPlan,
    output: &OutputSpec,
    ctx: &ExecutionContext,
) -> Result<(), RepeatError> {
    let repeats = usize::try_from(plan.full_repeats)
        .ok()
        .filter(|_| plan.full_repeats < MAX_CONCAT_SEGMENTS)
        .ok_or_else(|| {
            ExecutionError::new(
                ExecutionErrorKind::ToolFailure,
                format!(
                    "{} repeats exceed the concat limit of {} segments",
                    plan.full_repeats, MAX_CONCAT_SEGMENTS
                ),
            )
        })?;

    let scratch = ScratchSpace::create_next_to(&output.path)?;

    // The list file lives in scratch space, so relative entries would resolve there
    let source_path = fs::canonicalize(&source.path)
        .map_err(|e| ExecutionError::io("Failed to resolve source path", e))?;

    let mut segments: Vec<PathBuf> = vec![source_path.clone(); repeats];
    if plan.has_partial() {
        let segment = scratch.file(&format!("segment.{}", source.format.extension()));
        trim_segment(ffmpeg_path, &source_path, plan.partial_seconds, &segment, ctx)?;
        segments.push(segment);
    }
    if segments.is_empty() {
        return Err(ExecutionError::new(ExecutionErrorKind::ToolFailure, "nothing to concatenate").into());
    }

    let list_path = scratch.file("concat.txt");
    fs::write(&list_path, ffmpeg::concat_list(&segments))
        .map_err(|e| ExecutionError::io("Failed to write concat list", e))?;

    let staged = scratch.staged_output(output.format);
    let args = ffmpeg::concat_args(&list_path, mode, &staged);
    let result = ffmpeg::run_tool(ffmpeg_path, &args, ctx.cancel, ctx.timeout())?;

    if !result.success() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::ToolFailure,
            format!("ffmpeg concat exited with {}", result.status),
        )
        .with_tool_output(Some(result.status), &result.stderr)
        .into());
    }
    if !staged.is_file() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::ToolFailure,
            "ffmpeg reported success but wrote no output",
        )
        .with_tool_output(Some(result.status), &result.stderr)
        .into());
    }

    if ctx.settings.verify_output_duration {
        check_output_duration(&staged, plan.total_seconds, ctx.tool);
    }

    scratch.commit(&staged, &output.path)?;
    log::info!("Wrote {}", output.path.display());
    Ok(())
}

/// Cut the first `seconds` of the source into `segment` without re-encoding
///
/// The cut lands on the nearest packet boundary ffmpeg can find, so the
/// segment may differ slightly from the requested length.
fn trim_segment(
    ffmpeg_path: &Path,
    source: &Path,
    seconds: f64,
    segment: &Path,
    ctx: &ExecutionContext,
) -> Result<(), ExecutionError> {
    log::debug!("Trimming {:.3}s partial segment", seconds);
    let args = ffmpeg::trim_args(source, seconds, segment);
    let result = ffmpeg::run_tool(ffmpeg_path, &args, ctx.cancel, ctx.timeout())?;

    if !result.success() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::TrimFailure,
            format!("ffmpeg trim exited with {}", result.status),
        )
        .with_tool_output(Some(result.status), &result.stderr));
    }

    let written = fs::metadata(segment).map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(ExecutionError::new(
            ExecutionErrorKind::TrimFailure,
            format!("trimmed segment of {:.3}s is empty", seconds),
        )
        .with_tool_output(Some(result.status), &result.stderr));
    }
    Ok(())
}

/// Compare the produced duration against the plan; drift is logged, not fatal
fn check_output_duration(path: &Path, expected: f64, tool: &ToolCapability) {
    match audio::probe(path, tool) {
        Ok(probed) => {
            let drift = (probed.duration_seconds - expected).abs();
            if drift > DURATION_TOLERANCE_SECS {
                log::warn!(
                    "Output is {} long, expected {} ({:.2}s off)",
                    format_duration(probed.duration_seconds),
                    format_duration(expected),
                    drift
                );
            } else {
                log::debug!("Output duration {:.3}s (expected {:.3}s)", probed.duration_seconds, expected);
            }
        }
        Err(e) => log::warn!("Could not verify output duration: {}", e),
    }
}

fn concat_raw(
    source: &SourceTrack,
    plan: &RepeatPlan,
    output: &OutputSpec,
    ctx: &ExecutionContext,
) -> Result<(), RepeatError> {
    let scratch = ScratchSpace::create_next_to(&output.path)?;
    let staged = scratch.staged_output(AudioFormat::Wav);

    let reader = File::open(&source.path)
        .map(BufReader::new)
        .map_err(|e| ExecutionError::io("Failed to open source", e))?;
    let mut writer = File::create(&staged)
        .map(BufWriter::new)
        .map_err(|e| ExecutionError::io("Failed to create output", e))?;

    let summary = wav::raw_concat(reader, plan, &mut writer, ctx.cancel)?;
    writer
        .flush()
        .map_err(|e| ExecutionError::io("Failed to write WAV output", e))?;
    drop(writer);

    log::debug!(
        "Raw concat wrote {} frames from a {}-frame {} Hz source ({} bytes of samples)",
        summary.frames_written,
        summary.source_frames,
        summary.spec.sample_rate,
        summary.payload_bytes
    );

    scratch.commit(&staged, &output.path)?;
    log::info!("Wrote {}", output.path.display());
    Ok(())
}

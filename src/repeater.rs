//! Building a repeated audio file end to end
//!
//! Probe -> plan -> select -> execute. Everything up to `select` is pure
//! inspection, so bad targets and impossible conversions are rejected before
//! anything is written next to the output.

use std::path::{Path, PathBuf};

use crate::audio::{self, AudioFormat};
use crate::conversion::{self, ConcatStrategy, ExecutionContext, ToolCapability};
use crate::core::{self, OutputSpec, RepeatPlan, SourceTrack};
use crate::error::RepeatError;

/// A fully planned job, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatJob {
    pub source: SourceTrack,
    pub output: OutputSpec,
    pub plan: RepeatPlan,
    pub strategy: ConcatStrategy,
}

/// Probe the source, plan the repeats and pick a strategy without writing anything
///
/// The output format is taken from `output_format_tag`, else the output
/// path's extension, else the source format.
pub fn preview(
    source_path: &Path,
    target_seconds: f64,
    output_path: &Path,
    output_format_tag: Option<&str>,
    tool: &ToolCapability,
) -> Result<RepeatJob, RepeatError> {
    if !target_seconds.is_finite() || target_seconds <= 0.0 {
        return Err(RepeatError::InvalidTarget(target_seconds));
    }

    let probed = audio::probe(source_path, tool)?;
    let source = SourceTrack::from_probe(source_path, probed);

    let output = match output_format_tag {
        Some(tag) => OutputSpec::from_tag(output_path, tag, target_seconds)?,
        None => {
            let format = AudioFormat::from_path(output_path).unwrap_or(source.format);
            OutputSpec::new(output_path, format, target_seconds)?
        }
    };

    let plan = core::plan(source.duration_seconds, output.target_seconds)?;
    log::debug!(
        "Plan for {:.3}s source -> {:.3}s: {} full + {:.3}s partial",
        source.duration_seconds,
        output.target_seconds,
        plan.full_repeats,
        plan.partial_seconds
    );

    let strategy = conversion::select(&source, &output, tool.is_available())?;
    log::debug!(
        "Strategy: {} (ffmpeg needed: {})",
        strategy.describe(),
        strategy.uses_tool()
    );

    Ok(RepeatJob {
        source,
        output,
        plan,
        strategy,
    })
}

/// Execute a planned job
pub fn run(job: &RepeatJob, ctx: &ExecutionContext) -> Result<(), RepeatError> {
    conversion::execute(job.strategy, &job.source, &job.plan, &job.output, ctx)
}

/// Build a file that repeats `source_path` until it lasts `target_seconds`
pub fn build_repeated_file(
    source_path: &Path,
    target_seconds: f64,
    output_path: &Path,
    output_format_tag: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<OutputSpec, RepeatError> {
    let job = preview(source_path, target_seconds, output_path, output_format_tag, ctx.tool)?;
    run(&job, ctx)?;
    Ok(job.output)
}

/// Default output path: `<dir>/<stem>_repeated_<minutes>min.<ext>` beside the source
pub fn default_output_path(source_path: &Path, target_seconds: f64, format: AudioFormat) -> PathBuf {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let minutes = target_seconds / 60.0;
    let label = if minutes.fract() == 0.0 {
        format!("{}min", minutes as u64)
    } else {
        format!("{}s", target_seconds.round() as u64)
    };

    let file_name = format!("{}_repeated_{}.{}", stem, label, format.extension());
    match source_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

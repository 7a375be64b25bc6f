//! Audio Repeater
//!
//! Repeats an audio file until it reaches a target length, using ffmpeg when
//! available and a built-in WAV concatenator otherwise.

mod audio;
mod conversion;
mod core;
mod error;
mod logging;
mod media;
mod repeater;
mod test_fixtures;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::conversion::{locate_ffmpeg, CancelToken, ExecutionContext, ToolCapability};
use crate::core::{format_duration, format_size, AppSettings};
use crate::error::{ExecutionErrorKind, RepeatError};

/// Repeat an audio file until it reaches a target duration
#[derive(Parser, Debug)]
#[command(name = "audio-repeater")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use this ffmpeg binary instead of searching for one
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_ffmpeg")]
    ffmpeg: Option<PathBuf>,

    /// Never use ffmpeg (WAV only)
    #[arg(long, global = true)]
    no_ffmpeg: bool,

    /// Bitrate for lossy re-encodes, in kbps
    #[arg(long, global = true, value_name = "KBPS")]
    bitrate: Option<u32>,

    /// Show debug output on the terminal
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the repeated file
    Repeat {
        #[command(flatten)]
        job: JobArgs,

        /// Copy the finished file into this directory (e.g. a mounted USB drive) and verify it
        #[arg(long, value_name = "DIR")]
        copy_to: Option<PathBuf>,

        /// File name to use on the destination media
        #[arg(long, value_name = "NAME", requires = "copy_to")]
        copy_name: Option<String>,
    },
    /// Show how the file would be built without writing anything
    Plan {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Print duration, format and tags of an audio file
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Report whether ffmpeg was found and which formats are usable
    Tool,
    /// Show the effective settings, optionally saving them
    Config {
        /// Persist the effective settings (including --ffmpeg/--bitrate)
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Audio file to repeat
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[command(flatten)]
    target: TargetArgs,

    /// Output file (defaults to `<input>_repeated_<N>min.<ext>` next to the input)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output format: mp3, wav, m4a, flac or ogg (defaults to the output extension)
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Target length in minutes
    #[arg(short, long, value_name = "MINUTES")]
    minutes: Option<f64>,

    /// Target length in seconds
    #[arg(short, long, value_name = "SECONDS")]
    seconds: Option<f64>,
}

impl TargetArgs {
    fn target_seconds(&self) -> f64 {
        match (self.minutes, self.seconds) {
            (Some(minutes), _) => minutes * 60.0,
            (None, Some(seconds)) => seconds,
            // clap's group guarantees one of the two
            (None, None) => 0.0,
        }
    }
}

impl JobArgs {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.input.is_file(),
            "Input file does not exist: {}",
            self.input.display()
        );
        anyhow::ensure!(
            audio::is_audio_file(&self.input),
            "Not a supported audio file: {}",
            self.input.display()
        );
        let target = self.target.target_seconds();
        anyhow::ensure!(
            target.is_finite() && target > 0.0,
            "Target duration must be positive, got {}s",
            target
        );
        Ok(())
    }

    /// Output path as given, or the default derived from the input
    fn output_path(&self) -> PathBuf {
        if let Some(path) = &self.output {
            return path.clone();
        }
        let format = self
            .format
            .as_deref()
            .and_then(audio::AudioFormat::from_tag)
            .or_else(|| audio::AudioFormat::from_path(&self.input))
            .unwrap_or(audio::AudioFormat::Wav);
        repeater::default_output_path(&self.input, self.target.target_seconds(), format)
    }
}

/// Settings from disk with command-line overrides applied
fn effective_settings(cli: &Cli) -> AppSettings {
    let mut settings = AppSettings::load(cli.config.as_deref());
    if let Some(path) = &cli.ffmpeg {
        settings.ffmpeg_path = Some(path.clone());
    }
    if let Some(kbps) = cli.bitrate {
        settings.bitrate_kbps = kbps;
    }
    settings
}

fn discover_tool(cli: &Cli, settings: &AppSettings) -> ToolCapability {
    if cli.no_ffmpeg {
        log::debug!("ffmpeg disabled on the command line");
        return ToolCapability::Unavailable;
    }
    locate_ffmpeg(settings.ffmpeg_path.as_deref())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let settings = effective_settings(&cli);
    anyhow::ensure!(settings.bitrate_kbps > 0, "Bitrate must be positive");

    match &cli.command {
        Command::Repeat {
            job,
            copy_to,
            copy_name,
        } => {
            let tool = discover_tool(&cli, &settings);
            run_repeat(job, &tool, &settings, copy_to.as_deref(), copy_name.as_deref())
        }
        Command::Plan { job } => {
            let tool = discover_tool(&cli, &settings);
            run_plan(job, &tool)
        }
        Command::Probe { file } => {
            let tool = discover_tool(&cli, &settings);
            run_probe(file, &tool)
        }
        Command::Tool => {
            let tool = discover_tool(&cli, &settings);
            print_tool_status(&tool);
            Ok(())
        }
        Command::Config { save } => run_config(&cli, &settings, *save),
    }
}

fn run_repeat(
    job: &JobArgs,
    tool: &ToolCapability,
    settings: &AppSettings,
    copy_to: Option<&Path>,
    copy_name: Option<&str>,
) -> Result<()> {
    job.validate()?;
    let output_path = job.output_path();
    let target = job.target.target_seconds();

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);
    let ctx = ExecutionContext::new(tool, settings, &cancel);
    let output = match repeater::build_repeated_file(
        &job.input,
        target,
        &output_path,
        job.format.as_deref(),
        &ctx,
    ) {
        Ok(output) => output,
        Err(e) => {
            report_failure(&e);
            return Err(e).with_context(|| format!("Failed to build {}", output_path.display()));
        }
    };

    let size = std::fs::metadata(&output.path).map(|m| m.len()).unwrap_or(0);
    println!(
        "Created {} ({}, {})",
        output.path.display(),
        format_duration(output.target_seconds),
        format_size(size)
    );

    if let Some(media_dir) = copy_to {
        let copied = media::copy_to_media(&output.path, media_dir, copy_name)
            .with_context(|| format!("Failed to deliver to {}", media_dir.display()))?;
        println!("Copied and verified {}", copied.display());
    }

    Ok(())
}

/// Turn Ctrl-C into a cancelled job so scratch space is cleaned up on the way out
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupted, stopping...");
        token.cancel();
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
}

/// Print what ffmpeg said before the error itself is reported
fn report_failure(err: &RepeatError) {
    if err.execution_kind() == Some(ExecutionErrorKind::Cancelled) {
        log::info!("Cancelled; no output was written");
        return;
    }
    if let RepeatError::Execution(exec) = err {
        if let Some(code) = exec.exit_code {
            eprintln!("ffmpeg exit code: {}", code);
        }
        if let Some(diagnostics) = &exec.diagnostics {
            eprintln!("ffmpeg output:\n{}", diagnostics);
        }
    }
}

fn run_plan(job: &JobArgs, tool: &ToolCapability) -> Result<()> {
    job.validate()?;
    let output_path = job.output_path();
    let planned = repeater::preview(
        &job.input,
        job.target.target_seconds(),
        &output_path,
        job.format.as_deref(),
        tool,
    )
    .with_context(|| format!("Cannot repeat {}", job.input.display()))?;

    print_plan(&planned);
    Ok(())
}

fn print_plan(job: &repeater::RepeatJob) {
    let plan = &job.plan;
    println!(
        "Source:   {} ({}, {})",
        job.source.path.display(),
        job.source.format,
        format_duration(job.source.duration_seconds)
    );
    println!(
        "Output:   {} ({}, target {})",
        job.output.path.display(),
        job.output.format,
        format_duration(job.output.target_seconds)
    );
    if plan.has_partial() {
        println!(
            "Repeats:  {} full + {:.2}s partial",
            plan.full_repeats, plan.partial_seconds
        );
    } else {
        println!("Repeats:  {} full", plan.full_repeats);
    }
    println!(
        "Length:   {} ({:.2}s)",
        format_duration(plan.total_seconds),
        plan.total_seconds
    );
    println!("Strategy: {}", job.strategy.describe());
}

fn run_probe(file: &Path, tool: &ToolCapability) -> Result<()> {
    let probed = audio::probe(file, tool).with_context(|| format!("Cannot probe {}", file.display()))?;
    let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);

    println!("File:     {}", file.display());
    println!("Format:   {}", probed.format);
    println!(
        "Duration: {} ({:.3}s)",
        format_duration(probed.duration_seconds),
        probed.duration_seconds
    );
    println!("Size:     {}", format_size(size));
    if let Some(title) = &probed.tags.title {
        println!("Title:    {}", title);
    }
    if let Some(artist) = &probed.tags.artist {
        println!("Artist:   {}", artist);
    }
    if let Some(album) = &probed.tags.album {
        println!("Album:    {}", album);
    }
    Ok(())
}

fn print_tool_status(tool: &ToolCapability) {
    match tool.path() {
        Some(path) => println!("ffmpeg: {}", path.display()),
        None => println!("ffmpeg: not found (only WAV to WAV is available)"),
    }

    let list = |formats: Vec<audio::AudioFormat>| {
        formats
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let inputs = audio::AudioFormat::ALL
        .into_iter()
        .filter(|f| f.is_supported_input(tool.is_available()))
        .collect();
    let outputs = audio::AudioFormat::ALL
        .into_iter()
        .filter(|f| f.is_supported_output() && (tool.is_available() || f.is_uncompressed()))
        .collect();
    println!("Inputs:  {}", list(inputs));
    println!("Outputs: {}", list(outputs));
}

fn run_config(cli: &Cli, settings: &AppSettings, save: bool) -> Result<()> {
    let path = cli
        .config
        .clone()
        .or_else(AppSettings::default_path)
        .context("Could not determine the settings location")?;

    println!("Settings: {}", path.display());
    if let Some(log_file) = logging::get_log_file_path() {
        println!("Log file: {}", log_file.display());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(settings).context("Failed to serialize settings")?
    );

    if save {
        settings
            .save(&path)
            .map_err(anyhow::Error::msg)
            .context("Failed to save settings")?;
        println!("Saved.");
    }
    Ok(())
}

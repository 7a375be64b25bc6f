//! FFmpeg subprocess handling for concatenation

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use super::CancelToken;
use crate::audio::AudioFormat;
use crate::error::{ExecutionError, ExecutionErrorKind};

/// How often a running ffmpeg is checked for exit, cancellation and timeout
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Codec arguments for the concat pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecMode {
    /// Join compressed streams untouched
    Copy,
    /// Decode and encode with the given ffmpeg audio arguments
    Encode(Vec<String>),
}

impl CodecMode {
    /// Re-encode arguments for an output format
    ///
    /// Returns None for formats ffmpeg isn't asked to write.
    pub fn reencode(format: AudioFormat, bitrate: &str) -> Option<Self> {
        let args: Vec<&str> = match format {
            AudioFormat::Mp3 => vec!["-c:a", "libmp3lame", "-b:a", bitrate],
            AudioFormat::Wav => vec!["-c:a", "pcm_s16le"],
            AudioFormat::Flac => vec!["-c:a", "flac"],
            AudioFormat::Ogg => vec!["-c:a", "libvorbis", "-b:a", bitrate],
            AudioFormat::M4a => vec!["-c:a", "aac", "-b:a", bitrate],
            AudioFormat::Aac | AudioFormat::Wma => return None,
        };
        Some(CodecMode::Encode(args.into_iter().map(String::from).collect()))
    }

    fn args(&self) -> Vec<String> {
        match self {
            CodecMode::Copy => vec!["-c".into(), "copy".into()],
            CodecMode::Encode(args) => args.clone(),
        }
    }
}

/// Quote a path for a concat demuxer list file
///
/// Single quotes are closed, escaped and reopened: `it's` -> `'it'\''s'`.
fn quote_concat_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Build the contents of a concat demuxer list, one `file` line per segment
pub fn concat_list(segments: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for segment in segments {
        list.push_str("file ");
        list.push_str(&quote_concat_path(segment));
        list.push('\n');
    }
    list
}

fn common_args() -> Vec<OsString> {
    ["-hide_banner", "-nostdin", "-y"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

/// Arguments that cut the first `seconds` of `source` into `output` without re-encoding
pub fn trim_args(source: &Path, seconds: f64, output: &Path) -> Vec<OsString> {
    let mut args = common_args();
    args.push("-i".into());
    args.push(source.into());
    args.push("-t".into());
    args.push(format!("{:.6}", seconds).into());
    args.push("-vn".into());
    args.extend(CodecMode::Copy.args().into_iter().map(OsString::from));
    args.push(output.into());
    args
}

/// Arguments that join every entry of `list_path` into `output`
pub fn concat_args(list_path: &Path, mode: &CodecMode, output: &Path) -> Vec<OsString> {
    let mut args = common_args();
    for arg in ["-f", "concat", "-safe", "0", "-i"] {
        args.push(arg.into());
    }
    args.push(list_path.into());
    args.push("-vn".into());
    args.extend(mode.args().into_iter().map(OsString::from));
    args.push(output.into());
    args
}

/// Exit status and diagnostics of a completed ffmpeg run
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run ffmpeg to completion
///
/// The process is polled so that a cancelled token or an elapsed timeout
/// kills it; stderr is drained on a helper thread so a chatty ffmpeg can't
/// fill the pipe and stall. A non-zero exit is returned as a `ToolOutput`
/// for the caller to classify.
pub fn run_tool(
    ffmpeg_path: &Path,
    args: &[OsString],
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<ToolOutput, ExecutionError> {
    if cancel.is_cancelled() {
        return Err(ExecutionError::cancelled());
    }

    log::debug!(
        "Running: {} {}",
        ffmpeg_path.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut child = Command::new(ffmpeg_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ExecutionError::new(
                ExecutionErrorKind::ToolFailure,
                format!("Failed to spawn ffmpeg at {}: {}", ffmpeg_path.display(), e),
            )
        })?;

    let stderr = child.stderr.take();
    let stderr_thread = std::thread::spawn(move || {
        let mut captured = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut captured);
        }
        String::from_utf8_lossy(&captured).into_owned()
    });

    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            log::info!("Cancelled - killing ffmpeg process");
            stop_child(&mut child);
            let _ = stderr_thread.join();
            return Err(ExecutionError::cancelled());
        }

        if let Some(limit) = timeout
            && started.elapsed() > limit
        {
            log::warn!("ffmpeg exceeded {}s timeout - killing", limit.as_secs());
            let status = stop_child(&mut child);
            let stderr = stderr_thread.join().unwrap_or_default();
            return Err(ExecutionError::new(
                ExecutionErrorKind::ToolFailure,
                format!("ffmpeg timed out after {}s", limit.as_secs()),
            )
            .with_tool_output(status, &stderr));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = stderr_thread.join().unwrap_or_default();
                return Ok(ToolOutput { status, stderr });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                stop_child(&mut child);
                let _ = stderr_thread.join();
                return Err(ExecutionError::new(
                    ExecutionErrorKind::ToolFailure,
                    format!("Error waiting for ffmpeg: {}", e),
                ));
            }
        }
    }
}

/// Kill a running child and reap it
fn stop_child(child: &mut Child) -> Option<ExitStatus> {
    let _ = child.kill();
    child.wait().ok()
}

/// Ask ffmpeg for a file's duration
///
/// `ffmpeg -i <file>` without an output exits non-zero, but still prints the
/// input summary including a `Duration:` line.
pub fn probe_duration(ffmpeg_path: &Path, input: &Path) -> Option<f64> {
    let output = Command::new(ffmpeg_path)
        .arg("-hide_banner")
        .arg("-nostdin")
        .arg("-i")
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .ok()?;

    parse_duration(&String::from_utf8_lossy(&output.stderr))
}

/// Parse the `Duration: HH:MM:SS.xx` line of ffmpeg's input summary
pub fn parse_duration(stderr: &str) -> Option<f64> {
    let line = stderr.lines().find_map(|l| l.trim().strip_prefix("Duration:"))?;
    let stamp = line.split(',').next()?.trim();

    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total > 0.0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_order_and_header() {
        let segments = vec![
            PathBuf::from("/music/loop.mp3"),
            PathBuf::from("/music/loop.mp3"),
            PathBuf::from("/tmp/work/segment.mp3"),
        ];
        let list = concat_list(&segments);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ffconcat version 1.0");
        assert_eq!(lines[1], "file '/music/loop.mp3'");
        assert_eq!(lines[3], "file '/tmp/work/segment.mp3'");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/music/rock 'n' roll.mp3")]);
        assert!(list.contains(r"file '/music/rock '\''n'\'' roll.mp3'"));
    }

    #[test]
    fn test_concat_list_empty() {
        assert_eq!(concat_list(&[]), "ffconcat version 1.0\n");
    }

    #[test]
    fn test_concat_args_stream_copy() {
        let args = concat_args(
            Path::new("/tmp/list.txt"),
            &CodecMode::Copy,
            Path::new("/tmp/out.mp3"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-y", "-f", "concat", "-safe", "0", "-i",
                "/tmp/list.txt", "-vn", "-c", "copy", "/tmp/out.mp3",
            ]
        );
    }

    #[test]
    fn test_reencode_mp3_uses_bitrate() {
        let mode = CodecMode::reencode(AudioFormat::Mp3, "192k").unwrap();
        assert_eq!(
            mode,
            CodecMode::Encode(vec![
                "-c:a".into(),
                "libmp3lame".into(),
                "-b:a".into(),
                "192k".into()
            ])
        );
    }

    #[test]
    fn test_reencode_wav_is_pcm() {
        let mode = CodecMode::reencode(AudioFormat::Wav, "192k").unwrap();
        assert_eq!(mode, CodecMode::Encode(vec!["-c:a".into(), "pcm_s16le".into()]));
    }

    #[test]
    fn test_reencode_covers_outputs_only() {
        for format in AudioFormat::ALL {
            assert_eq!(
                CodecMode::reencode(format, "128k").is_some(),
                format.is_supported_output()
            );
        }
    }

    #[test]
    fn test_trim_args() {
        let args = trim_args(Path::new("/music/a.flac"), 5.0, Path::new("/tmp/seg.flac"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "5.000000");
        assert!(args.ends_with(&["-vn".into(), "-c".into(), "copy".into(), "/tmp/seg.flac".into()]));
    }

    #[test]
    fn test_parse_duration() {
        let stderr = "Input #0, mp3, from 'a.mp3':\n  Metadata:\n    title: x\n  Duration: 00:03:00.05, start: 0.025057, bitrate: 192 kb/s\n";
        let d = parse_duration(stderr).unwrap();
        assert!((d - 180.05).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_missing_or_na() {
        assert_eq!(parse_duration("no summary here"), None);
        assert_eq!(parse_duration("  Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn test_run_tool_missing_binary() {
        let err = run_tool(
            Path::new("/nonexistent/ffmpeg"),
            &[],
            &CancelToken::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ToolFailure);
    }

    #[test]
    fn test_run_tool_precancelled() {
        let token = CancelToken::new();
        token.cancel();
        let err = run_tool(Path::new("/nonexistent/ffmpeg"), &[], &token, None).unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_reports_exit_status() {
        let output = run_tool(
            Path::new("/bin/sh"),
            &["-c".into(), "echo oops >&2; exit 3".into()],
            &CancelToken::new(),
            None,
        )
        .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert!(output.stderr.contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_timeout_kills_process() {
        let err = run_tool(
            Path::new("/bin/sh"),
            &["-c".into(), "exec sleep 30".into()],
            &CancelToken::new(),
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ToolFailure);
        assert!(err.message.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_child_reaps_process() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exec sleep 30"])
            .spawn()
            .unwrap();

        let status = stop_child(&mut child).unwrap();
        assert!(!status.success());
        // Already reaped: the status is cached, no zombie left to wait on
        assert!(matches!(child.try_wait(), Ok(Some(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_cancel_from_another_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });

        let started = Instant::now();
        let err = run_tool(
            Path::new("/bin/sh"),
            &["-c".into(), "exec sleep 30".into()],
            &token,
            None,
        )
        .unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err.kind, ExecutionErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

//! Test fixtures for repeat tests
//!
//! WAV fixtures are synthesized with hound so most tests need no external
//! tools. Compressed fixtures are generated with ffmpeg when one is found.

#![cfg(test)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::conversion::{locate_ffmpeg, ToolCapability};

/// Shape of a synthesized WAV fixture
#[derive(Debug, Clone, Copy)]
pub struct FixtureSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl FixtureSpec {
    pub fn mono_16(sample_rate: u32) -> Self {
        Self {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    pub fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: SampleFormat::Int,
        }
    }
}

/// A 440 Hz tone as an in-memory WAV file
///
/// Every sample is distinct enough from its neighbours that misplaced
/// segments show up in sample comparisons.
pub fn wav_bytes(spec: FixtureSpec, seconds: f64) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec.wav_spec()).unwrap();
        let frames = (seconds * spec.sample_rate as f64).round() as u64;
        let amplitude = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f64 * 0.8;
        for n in 0..frames {
            let t = n as f64 / spec.sample_rate as f64;
            let value = ((t * 440.0 * std::f64::consts::TAU).sin() * amplitude) as i32;
            for _ in 0..spec.channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Write a tone WAV to `dir/<name>.wav`
pub fn write_sine_wav(dir: &Path, name: &str, spec: FixtureSpec, seconds: f64) -> PathBuf {
    let path = dir.join(format!("{}.wav", name));
    std::fs::write(&path, wav_bytes(spec, seconds)).unwrap();
    path
}

/// ffmpeg, when one is installed
pub fn ffmpeg() -> Option<PathBuf> {
    match locate_ffmpeg(None) {
        ToolCapability::Available { path } => Some(path),
        ToolCapability::Unavailable => None,
    }
}

/// Generate a tone in a compressed format with ffmpeg
///
/// Returns None when ffmpeg is missing or lacks the encoder, so callers can
/// skip instead of failing on machines without the tool.
pub fn generate_audio_file(dir: &Path, format: &str, duration_secs: u32) -> Option<PathBuf> {
    let ffmpeg = ffmpeg()?;
    let output_path = dir.join(format!("tone_{}.{}", duration_secs, format));

    let codec: &[&str] = match format {
        "mp3" => &["-codec:a", "libmp3lame", "-b:a", "128k"],
        "flac" => &["-codec:a", "flac"],
        "wav" => &["-codec:a", "pcm_s16le"],
        "m4a" => &["-codec:a", "aac", "-b:a", "128k"],
        "ogg" => &["-codec:a", "libvorbis"],
        _ => panic!("Unsupported format: {}", format),
    };

    let output = Command::new(&ffmpeg)
        .arg("-f")
        .arg("lavfi")
        .arg("-i")
        .arg(format!("sine=frequency=440:duration={}", duration_secs))
        .args(codec)
        .arg("-y")
        .arg(&output_path)
        .output()
        .ok()?;

    output.status.success().then_some(output_path)
}

use std::fs::File;
use std::path::Path;

use lofty::{Accessor, AudioFile, Probe, TaggedFileExt};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioFormat;
use crate::conversion::{self, ToolCapability};
use crate::error::RepeatError;

/// Basic descriptive tags, reported alongside the duration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// What the prober learned about a file
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedAudio {
    pub duration_seconds: f64,
    pub format: AudioFormat,
    pub tags: BasicTags,
}

/// Probe an audio file for its duration, format and basic tags
///
/// Duration comes from lofty's properties; symphonia is consulted when lofty
/// can't read the file or reports zero, and ffmpeg's own report is the last
/// resort (it is the only reader for WMA).
pub fn probe(path: &Path, tool: &ToolCapability) -> Result<ProbedAudio, RepeatError> {
    if !path.is_file() {
        return Err(RepeatError::unreadable(path, "file not found"));
    }

    let format = AudioFormat::from_path(path)
        .ok_or_else(|| RepeatError::unreadable(path, "unsupported file extension"))?;

    let (lofty_duration, tags) = match read_with_lofty(path) {
        Ok(found) => found,
        Err(e) => {
            log::debug!("lofty could not read {}: {}", path.display(), e);
            (None, BasicTags::default())
        }
    };

    let duration = lofty_duration
        .or_else(|| match symphonia_duration(path) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("symphonia could not read {}: {}", path.display(), e);
                None
            }
        })
        .or_else(|| {
            tool.path()
                .and_then(|ffmpeg| conversion::ffmpeg::probe_duration(ffmpeg, path))
        })
        .ok_or_else(|| RepeatError::unreadable(path, "could not determine duration"))?;

    log::debug!(
        "Probed {}: {:.3}s ({})",
        path.display(),
        duration,
        format
    );

    Ok(ProbedAudio {
        duration_seconds: duration,
        format,
        tags,
    })
}

fn read_with_lofty(path: &Path) -> Result<(Option<f64>, BasicTags), String> {
    let tagged_file = Probe::open(path)
        .map_err(|e| format!("Failed to open file: {}", e))?
        .read()
        .map_err(|e| format!("Failed to read file: {}", e))?;

    let secs = tagged_file.properties().duration().as_secs_f64();
    let duration = (secs > 0.0).then_some(secs);

    let tags = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .map(|tag| BasicTags {
            title: tag.title().map(|s| s.into_owned()),
            artist: tag.artist().map(|s| s.into_owned()),
            album: tag.album().map(|s| s.into_owned()),
        })
        .unwrap_or_default();

    Ok((duration, tags))
}

fn symphonia_duration(path: &Path) -> Result<Option<f64>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open file: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to probe audio format: {}", e))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| "No default track found".to_string())?;

    let (Some(sample_rate), Some(n_frames)) =
        (track.codec_params.sample_rate, track.codec_params.n_frames)
    else {
        return Ok(None);
    };
    if sample_rate == 0 || n_frames == 0 {
        return Ok(None);
    }

    Ok(Some(n_frames as f64 / sample_rate as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{write_sine_wav, FixtureSpec};
    use tempfile::TempDir;

    #[test]
    fn test_probe_wav_duration() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_wav(dir.path(), "tone", FixtureSpec::mono_16(8000), 2.0);

        let probed = probe(&path, &ToolCapability::Unavailable).unwrap();
        assert_eq!(probed.format, AudioFormat::Wav);
        assert!((probed.duration_seconds - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_probe_missing_file() {
        let result = probe(Path::new("/nonexistent/tone.wav"), &ToolCapability::Unavailable);
        assert!(matches!(result, Err(RepeatError::UnreadableFile { .. })));
    }

    #[test]
    fn test_probe_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not audio").unwrap();

        let result = probe(&path, &ToolCapability::Unavailable);
        assert!(matches!(result, Err(RepeatError::UnreadableFile { .. })));
    }

    #[test]
    fn test_probe_corrupt_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF\x00\x00\x00\x00garbage").unwrap();

        let result = probe(&path, &ToolCapability::Unavailable);
        assert!(matches!(result, Err(RepeatError::UnreadableFile { .. })));
    }
}

//! In-process WAV concatenation
//!
//! Used when ffmpeg is unavailable. Samples are copied unchanged, so the
//! output is bit-identical to the source apart from the header, which is
//! written fresh for the new payload length.

use std::io::{Read, Seek, Write};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::CancelToken;
use crate::core::RepeatPlan;
use crate::error::{ExecutionError, ExecutionErrorKind, RepeatError};

/// RIFF sizes are 32-bit; leave room for the largest header hound writes
pub const MAX_PAYLOAD_BYTES: u64 = u32::MAX as u64 - 128;

/// What the concatenator wrote
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawConcatSummary {
    pub spec: WavSpec,
    pub source_frames: u64,
    pub frames_written: u64,
    pub payload_bytes: u64,
}

/// Bytes per interleaved frame
pub fn frame_bytes(spec: &WavSpec) -> u64 {
    spec.channels as u64 * spec.bits_per_sample.div_ceil(8) as u64
}

/// Whole frames covered by `seconds`, rounded down so no frame is split
pub fn partial_frames(spec: &WavSpec, seconds: f64, source_frames: u64) -> u64 {
    let frames = (seconds.max(0.0) * spec.sample_rate as f64).floor() as u64;
    frames.min(source_frames)
}

/// Exact payload size (data chunk bytes) the concatenator will produce
pub fn expected_payload_bytes(spec: &WavSpec, source_frames: u64, plan: &RepeatPlan) -> u64 {
    let frames = plan
        .full_repeats
        .saturating_mul(source_frames)
        .saturating_add(partial_frames(spec, plan.partial_seconds, source_frames));
    frames.saturating_mul(frame_bytes(spec))
}

/// Check that the header describes PCM we can copy frame by frame
pub fn validate_spec(spec: &WavSpec) -> Result<(), RepeatError> {
    if spec.channels == 0 {
        return Err(RepeatError::MalformedHeader("channel count is zero".into()));
    }
    if spec.sample_rate == 0 {
        return Err(RepeatError::MalformedHeader("sample rate is zero".into()));
    }
    let bits_ok = match spec.sample_format {
        SampleFormat::Int => matches!(spec.bits_per_sample, 8 | 16 | 24 | 32),
        SampleFormat::Float => spec.bits_per_sample == 32,
    };
    if !bits_ok {
        return Err(RepeatError::MalformedHeader(format!(
            "{} bits per sample is not valid for {:?} samples",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    Ok(())
}

/// A short read surfaces from hound as an io::Error without an OS code
/// ("Failed to read enough bytes."), which means the source ended early.
/// Errors the OS reported are real I/O failures.
fn source_truncated(err: &std::io::Error) -> bool {
    err.raw_os_error().is_none()
}

fn source_error(context: &str, err: hound::Error) -> RepeatError {
    match err {
        hound::Error::IoError(e) if !source_truncated(&e) => ExecutionError::io(context, e).into(),
        hound::Error::IoError(e) => RepeatError::MalformedHeader(format!("source ended early: {}", e)),
        other => RepeatError::MalformedHeader(other.to_string()),
    }
}

fn header_error(err: hound::Error) -> RepeatError {
    source_error("Failed to read WAV header", err)
}

fn read_error(err: hound::Error) -> RepeatError {
    source_error("Failed to read WAV samples", err)
}

fn write_error(err: hound::Error) -> RepeatError {
    match err {
        hound::Error::IoError(e) => ExecutionError::io("Failed to write WAV output", e).into(),
        other => ExecutionError::new(
            ExecutionErrorKind::IoFailure,
            format!("Failed to write WAV output: {}", other),
        )
        .into(),
    }
}

/// Repeat the source's sample data according to `plan` and write a new WAV to `sink`
///
/// The source is read once per repetition (seeking back to the first frame),
/// so memory use does not grow with the target length.
pub fn raw_concat<R, W>(
    source: R,
    plan: &RepeatPlan,
    sink: W,
    cancel: &CancelToken,
) -> Result<RawConcatSummary, RepeatError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut reader = WavReader::new(source).map_err(header_error)?;
    let spec = reader.spec();
    validate_spec(&spec)?;

    let source_frames = reader.duration() as u64;
    let payload_bytes = expected_payload_bytes(&spec, source_frames, plan);
    if payload_bytes > MAX_PAYLOAD_BYTES {
        return Err(ExecutionError::new(
            ExecutionErrorKind::IoFailure,
            format!(
                "output would need {} bytes of samples, beyond the 4 GiB WAV limit",
                payload_bytes
            ),
        )
        .into());
    }

    let tail_frames = partial_frames(&spec, plan.partial_seconds, source_frames);
    let total_frames = plan
        .full_repeats
        .saturating_mul(source_frames)
        .saturating_add(tail_frames);
    if total_frames == 0 {
        log::warn!(
            "{:.6}s is shorter than one frame at {} Hz",
            plan.total_seconds,
            spec.sample_rate
        );
        return Err(RepeatError::InvalidTarget(plan.total_seconds));
    }
    log::debug!(
        "Raw concat: {} Hz, {} ch, {} bit, {} frames x {} + {} frames",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        source_frames,
        plan.full_repeats,
        tail_frames
    );

    let mut writer = WavWriter::new(sink, spec).map_err(write_error)?;

    let mut frames_written = 0u64;
    let segments = (0..plan.full_repeats)
        .map(|_| source_frames)
        .chain((tail_frames > 0).then_some(tail_frames));
    for frames in segments {
        if cancel.is_cancelled() {
            return Err(ExecutionError::cancelled().into());
        }
        match spec.sample_format {
            SampleFormat::Int => copy_frames::<i32, _, _>(&mut reader, &mut writer, frames)?,
            SampleFormat::Float => copy_frames::<f32, _, _>(&mut reader, &mut writer, frames)?,
        }
        frames_written += frames;
    }

    writer.finalize().map_err(write_error)?;

    Ok(RawConcatSummary {
        spec,
        source_frames,
        frames_written,
        payload_bytes,
    })
}

/// Copy the first `frames` frames of the source into the writer
fn copy_frames<S, R, W>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<W>,
    frames: u64,
) -> Result<(), RepeatError>
where
    S: hound::Sample,
    R: Read + Seek,
    W: Write + Seek,
{
    reader
        .seek(0)
        .map_err(|e| ExecutionError::io("Failed to rewind source", e))?;

    let wanted = frames * reader.spec().channels as u64;
    let mut copied = 0u64;
    for sample in reader.samples::<S>().take(wanted as usize) {
        writer
            .write_sample(sample.map_err(read_error)?)
            .map_err(write_error)?;
        copied += 1;
    }

    if copied != wanted {
        return Err(RepeatError::MalformedHeader(format!(
            "data chunk ended after {} of {} samples",
            copied, wanted
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan;
    use crate::test_fixtures::{wav_bytes, FixtureSpec};
    use std::io::Cursor;

    fn read_all_i32(bytes: &[u8]) -> (WavSpec, Vec<i32>) {
        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    fn run(source: &[u8], plan: &RepeatPlan) -> (RawConcatSummary, Vec<u8>) {
        let mut out = Cursor::new(Vec::new());
        let summary =
            raw_concat(Cursor::new(source), plan, &mut out, &CancelToken::new()).unwrap();
        (summary, out.into_inner())
    }

    #[test]
    fn test_wav_scenario_ten_to_twenty_five_seconds() {
        let spec = FixtureSpec::mono_16(8000);
        let source = wav_bytes(spec, 10.0);
        let p = plan(10.0, 25.0).unwrap();

        let (summary, output) = run(&source, &p);

        // 2 full copies + 5 seconds, 2 bytes per frame
        assert_eq!(summary.source_frames, 80_000);
        assert_eq!(summary.frames_written, 200_000);
        assert_eq!(summary.payload_bytes, 400_000);

        let (out_spec, out_samples) = read_all_i32(&output);
        let (_, src_samples) = read_all_i32(&source);
        assert_eq!(out_spec, spec.wav_spec());
        assert_eq!(out_samples.len(), 200_000);
        assert_eq!(&out_samples[..80_000], &src_samples[..]);
        assert_eq!(&out_samples[80_000..160_000], &src_samples[..]);
        assert_eq!(&out_samples[160_000..], &src_samples[..40_000]);
    }

    #[test]
    fn test_header_reports_recomputed_payload_size() {
        let spec = FixtureSpec::mono_16(8000);
        let source = wav_bytes(spec, 1.0);
        let p = plan(1.0, 3.5).unwrap();

        let (summary, output) = run(&source, &p);

        let reader = WavReader::new(Cursor::new(&output)).unwrap();
        assert_eq!(reader.duration() as u64, summary.frames_written);
        assert_eq!(
            reader.len() as u64 * 2,
            expected_payload_bytes(&spec.wav_spec(), 8000, &p)
        );
    }

    #[test]
    fn test_partial_is_frame_aligned_for_stereo_24_bit() {
        let spec = FixtureSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 24,
        };
        let source = wav_bytes(spec, 0.5);
        let p = RepeatPlan {
            full_repeats: 1,
            partial_seconds: 0.123_456,
            total_seconds: 0.623_456,
        };

        let (summary, output) = run(&source, &p);

        // floor(0.123456 * 44100) = 5444 frames
        assert_eq!(summary.frames_written, 22_050 + 5_444);
        assert_eq!(summary.payload_bytes, (22_050 + 5_444) * 6);

        let (out_spec, out_samples) = read_all_i32(&output);
        assert_eq!(out_spec.bits_per_sample, 24);
        assert_eq!(out_samples.len() % 2, 0);
        assert_eq!(out_samples.len() as u64, summary.frames_written * 2);
    }

    #[test]
    fn test_shorter_than_source() {
        let spec = FixtureSpec::mono_16(8000);
        let source = wav_bytes(spec, 2.0);
        let p = plan(2.0, 0.5).unwrap();

        let (summary, _) = run(&source, &p);
        assert_eq!(summary.frames_written, 4000);
    }

    #[test]
    fn test_partial_frames_rounds_down_and_clamps() {
        let spec = FixtureSpec::mono_16(8000).wav_spec();
        assert_eq!(partial_frames(&spec, 0.00019, 8000), 1);
        assert_eq!(partial_frames(&spec, 0.0001, 8000), 0);
        assert_eq!(partial_frames(&spec, 5.0, 8000), 8000);
    }

    #[test]
    fn test_expected_payload_bytes() {
        let spec = FixtureSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
        }
        .wav_spec();
        let p = plan(10.0, 25.0).unwrap();
        assert_eq!(
            expected_payload_bytes(&spec, 441_000, &p),
            (2 * 441_000 + 220_500) * 4
        );
    }

    #[test]
    fn test_rejects_non_riff_input() {
        let mut out = Cursor::new(Vec::new());
        let result = raw_concat(
            Cursor::new(b"definitely not a wav file at all, sorry".to_vec()),
            &plan(1.0, 2.0).unwrap(),
            &mut out,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(RepeatError::MalformedHeader(_))));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let mut out = Cursor::new(Vec::new());
        let result = raw_concat(
            Cursor::new(b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec()),
            &plan(1.0, 2.0).unwrap(),
            &mut out,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(RepeatError::MalformedHeader(_))));
    }

    #[test]
    fn test_rejects_truncated_chunk_header() {
        let mut out = Cursor::new(Vec::new());
        let result = raw_concat(
            Cursor::new(b"RIFF\x10\x00\x00\x00WAVEjunk".to_vec()),
            &plan(1.0, 2.0).unwrap(),
            &mut out,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(RepeatError::MalformedHeader(_))));
    }

    #[test]
    fn test_short_data_chunk_is_malformed() {
        let source = wav_bytes(FixtureSpec::mono_16(8000), 1.0);
        let cut = source[..source.len() / 2].to_vec();

        let mut out = Cursor::new(Vec::new());
        let err = raw_concat(Cursor::new(cut), &plan(1.0, 2.5).unwrap(), &mut out, &CancelToken::new())
            .unwrap_err();
        match err {
            RepeatError::MalformedHeader(msg) => assert!(msg.contains("ended early"), "{}", msg),
            other => panic!("expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_os_read_errors_stay_io_failures() {
        let denied = std::io::Error::from_raw_os_error(13);
        let err = read_error(hound::Error::IoError(denied));
        assert_eq!(err.execution_kind(), Some(ExecutionErrorKind::IoFailure));

        let short = std::io::Error::other("Failed to read enough bytes.");
        assert!(matches!(
            header_error(hound::Error::IoError(short)),
            RepeatError::MalformedHeader(_)
        ));
    }

    #[test]
    fn test_target_below_one_frame_is_rejected() {
        let source = wav_bytes(FixtureSpec::mono_16(8000), 1.0);
        let p = plan(1.0, 0.0001).unwrap();
        assert_eq!((p.full_repeats, p.total_seconds), (0, 0.0001));

        let mut out = Cursor::new(Vec::new());
        let err = raw_concat(Cursor::new(&source), &p, &mut out, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RepeatError::InvalidTarget(_)));
        assert!(out.into_inner().is_empty());
    }

    #[test]
    fn test_validate_spec() {
        let good = FixtureSpec::mono_16(8000).wav_spec();
        assert!(validate_spec(&good).is_ok());

        let no_channels = WavSpec { channels: 0, ..good };
        assert!(matches!(
            validate_spec(&no_channels),
            Err(RepeatError::MalformedHeader(_))
        ));

        let no_rate = WavSpec { sample_rate: 0, ..good };
        assert!(validate_spec(&no_rate).is_err());

        let half_float = WavSpec {
            sample_format: SampleFormat::Float,
            ..good
        };
        assert!(validate_spec(&half_float).is_err());

        let odd_bits = WavSpec { bits_per_sample: 12, ..good };
        assert!(validate_spec(&odd_bits).is_err());
    }

    #[test]
    fn test_oversized_output_rejected_before_writing() {
        let spec = FixtureSpec::mono_16(8000);
        let source = wav_bytes(spec, 1.0);
        let p = RepeatPlan {
            full_repeats: 1_000_000,
            partial_seconds: 0.0,
            total_seconds: 1_000_000.0,
        };

        let mut out = Cursor::new(Vec::new());
        let err = raw_concat(Cursor::new(&source), &p, &mut out, &CancelToken::new()).unwrap_err();
        assert_eq!(err.execution_kind(), Some(ExecutionErrorKind::IoFailure));
        assert!(out.into_inner().is_empty());
    }

    #[test]
    fn test_cancelled_before_copy() {
        let source = wav_bytes(FixtureSpec::mono_16(8000), 1.0);
        let token = CancelToken::new();
        token.cancel();

        let mut out = Cursor::new(Vec::new());
        let err = raw_concat(Cursor::new(&source), &plan(1.0, 3.0).unwrap(), &mut out, &token)
            .unwrap_err();
        assert_eq!(err.execution_kind(), Some(ExecutionErrorKind::Cancelled));
    }
}

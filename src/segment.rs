use crate::error::{Error, Result};
use crate::wav;
use std::path::Path;
use tempfile::NamedTempFile;

/// Requested windows shorter than this fall back to the centered window.
pub const MIN_WINDOW_SECS: f64 = 1.0;

/// Resolves the analysis window in seconds.
///
/// An explicit `[start, end)` is honored as-is. When the bounds are absent,
/// or the requested slice is shorter than [`MIN_WINDOW_SECS`], the window is
/// `default_duration` seconds centered in the recording, clamped so the
/// start is never negative.
pub fn resolve_window(
    total_secs: f64,
    start: Option<f64>,
    end: Option<f64>,
    default_duration: f64,
) -> (f64, f64) {
    if let (Some(start), Some(end)) = (start, end) {
        if end - start >= MIN_WINDOW_SECS {
            return (start, end);
        }
        tracing::warn!(start, end, "requested segment too short, using centered window");
    }

    let mid_start = (total_secs / 2.0 - default_duration / 2.0).max(0.0);
    (mid_start, mid_start + default_duration)
}

/// Cuts the analysis window out of `path` and materializes it as a
/// standalone temporary WAV file.
///
/// The returned [`NamedTempFile`] owns the artifact: it is removed when the
/// handle is dropped, on every exit path of the caller.
pub fn extract_segment(
    path: &Path,
    start: Option<f64>,
    end: Option<f64>,
    default_duration: f64,
) -> Result<NamedTempFile> {
    let (samples, spec) = wav::read_wav(path).map_err(segment_err)?;

    let channels = spec.channels.max(1) as usize;
    let total_frames = samples.len() / channels;
    let total_secs = total_frames as f64 / spec.sample_rate as f64;

    let (win_start, win_end) = resolve_window(total_secs, start, end, default_duration);
    let start_frame = ((win_start * spec.sample_rate as f64) as usize).min(total_frames);
    let end_frame = ((win_end * spec.sample_rate as f64) as usize)
        .min(total_frames)
        .max(start_frame);
    let slice = &samples[start_frame * channels..end_frame * channels];

    let file = tempfile::Builder::new()
        .prefix("emorec_segment_")
        .suffix(".wav")
        .tempfile()
        .map_err(segment_err)?;
    wav::write_wav(file.path(), slice, spec).map_err(segment_err)?;

    tracing::debug!(
        start = win_start,
        end = win_end,
        path = %file.path().display(),
        "materialized analysis segment"
    );
    Ok(file)
}

fn segment_err<E: std::error::Error + Send + Sync + 'static>(source: E) -> Error {
    Error::SegmentExtraction {
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hound::{SampleFormat, WavSpec};

    #[test]
    fn explicit_bounds_are_honored() {
        let (start, end) = resolve_window(40.0, Some(10.0), Some(20.0), 30.0);
        assert_relative_eq!(start, 10.0);
        assert_relative_eq!(end, 20.0);
    }

    #[test]
    fn absent_bounds_use_centered_window() {
        let (start, end) = resolve_window(40.0, None, None, 30.0);
        assert_relative_eq!(start, 5.0);
        assert_relative_eq!(end, 35.0);
    }

    #[test]
    fn short_request_falls_back_to_centered_window() {
        let (start, end) = resolve_window(40.0, Some(12.0), Some(12.5), 30.0);
        assert_relative_eq!(start, 5.0);
        assert_relative_eq!(end, 35.0);
    }

    #[test]
    fn inverted_request_falls_back_to_centered_window() {
        let (start, end) = resolve_window(40.0, Some(20.0), Some(10.0), 30.0);
        assert_relative_eq!(start, 5.0);
        assert_relative_eq!(end, 35.0);
    }

    #[test]
    fn centered_window_clamps_to_zero() {
        let (start, end) = resolve_window(10.0, None, None, 30.0);
        assert_relative_eq!(start, 0.0);
        assert_relative_eq!(end, 30.0);
    }

    #[test]
    fn one_second_request_is_kept() {
        let (start, end) = resolve_window(40.0, Some(3.0), Some(4.0), 30.0);
        assert_relative_eq!(start, 3.0);
        assert_relative_eq!(end, 4.0);
    }

    fn write_tone(path: &Path, secs: f64) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let n = (secs * spec.sample_rate as f64) as usize;
        let samples: Vec<i16> = (0..n)
            .map(|i| {
                let t = i as f32 / spec.sample_rate as f32;
                ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16
            })
            .collect();
        crate::wav::write_wav(path, &samples, spec).unwrap();
    }

    #[test]
    fn extracted_segment_has_requested_duration() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tone.wav");
        write_tone(&source, 4.0);

        let segment = extract_segment(&source, Some(1.0), Some(3.0), 2.0).unwrap();
        let (samples, spec) = crate::wav::read_wav(segment.path()).unwrap();
        let secs = samples.len() as f64 / spec.sample_rate as f64;
        assert_relative_eq!(secs, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn segment_artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tone.wav");
        write_tone(&source, 2.0);

        let segment = extract_segment(&source, None, None, 1.0).unwrap();
        let path = segment.path().to_path_buf();
        assert!(path.exists());
        drop(segment);
        assert!(!path.exists());
    }

    #[test]
    fn unreadable_source_is_a_segment_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        let err = extract_segment(&missing, None, None, 30.0).unwrap_err();
        assert!(matches!(err, Error::SegmentExtraction { .. }));
    }
}

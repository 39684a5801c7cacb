use crate::error::{Error, Result};
use crate::wav;
use ndarray::Array1;
use rustfft::{num_complex::Complex, FftPlanner};
use std::path::Path;

/// The fixed feature schema the models were trained on. Order matters: the
/// output vector of [`extract_features`] follows this list position by
/// position.
pub const FEATURE_NAMES: [&str; 39] = [
    "audspec_lengthL1norm_sma_meanSegLen",
    "audspec_lengthL1norm_sma_stddev",
    "audspec_lengthL1norm_sma_skewness",
    "audspec_lengthL1norm_sma_kurtosis",
    "audspec_lengthL1norm_sma_maxSegLen",
    "audspecRasta_lengthL1norm_sma_meanSegLen",
    "audspecRasta_lengthL1norm_sma_stddev",
    "audspecRasta_lengthL1norm_sma_skewness",
    "audspecRasta_lengthL1norm_sma_kurtosis",
    "audspecRasta_lengthL1norm_sma_maxSegLen",
    "pcm_RMSenergy_sma_meanSegLen",
    "pcm_RMSenergy_sma_stddev",
    "pcm_RMSenergy_sma_skewness",
    "pcm_RMSenergy_sma_kurtosis",
    "pcm_RMSenergy_sma_maxSegLen",
    "pcm_zcr_sma_meanSegLen",
    "pcm_zcr_sma_stddev",
    "pcm_zcr_sma_skewness",
    "pcm_zcr_sma_kurtosis",
    "pcm_zcr_sma_maxSegLen",
    "audspec_lengthL1norm_sma_de_meanSegLen",
    "audspec_lengthL1norm_sma_de_stddev",
    "audspec_lengthL1norm_sma_de_skewness",
    "audspec_lengthL1norm_sma_de_kurtosis",
    "audspec_lengthL1norm_sma_de_maxSegLen",
    "audspecRasta_lengthL1norm_sma_de_meanSegLen",
    "audspecRasta_lengthL1norm_sma_de_stddev",
    "audspecRasta_lengthL1norm_sma_de_skewness",
    "audspecRasta_lengthL1norm_sma_de_kurtosis",
    "audspecRasta_lengthL1norm_sma_de_maxSegLen",
    "audSpec_Rfilt_sma[0]_meanSegLen",
    "audSpec_Rfilt_sma[0]_stddev",
    "audSpec_Rfilt_sma[1]_meanSegLen",
    "audSpec_Rfilt_sma[1]_stddev",
    "audSpec_Rfilt_sma[2]_meanSegLen",
    "pcm_RMSenergy_sma_risetime",
    "pcm_zcr_sma_risetime",
    "audspec_lengthL1norm_sma_risetime",
    "audspecRasta_lengthL1norm_sma_risetime",
];

const FRAME_SECS: f64 = 0.025;
const HOP_SECS: f64 = 0.010;
const NUM_BANDS: usize = 26;

/// Extracts the fixed-length feature vector from an audio segment file.
///
/// Computes frame-level low-level descriptors (auditory spectrum L1 norm and
/// its RASTA-filtered variant, RMS energy, zero-crossing rate, smoothed and
/// with first-order deltas), summarizes each contour with functional
/// statistics, and projects the resulting wide table onto
/// [`FEATURE_NAMES`]. Schema entries with no matching column are zero-filled
/// with a warning; the output length is always the schema length.
pub fn extract_features(path: &Path) -> Result<Array1<f32>> {
    let (samples, spec) = wav::read_wav(path).map_err(feature_err)?;
    let mono = downmix(&samples, spec.channels);
    if mono.is_empty() {
        return Err(Error::FeatureExtraction {
            source: "audio segment contains no samples".into(),
        });
    }

    let columns = wide_table(&mono, spec.sample_rate);
    Ok(project(&columns))
}

fn feature_err<E: std::error::Error + Send + Sync + 'static>(source: E) -> Error {
    Error::FeatureExtraction {
        source: Box::new(source),
    }
}

fn downmix(samples: &[i16], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
            sum / channels as f32
        })
        .collect()
}

/// Frame-level descriptor extraction plus functional statistics, as a named
/// column table.
pub(crate) fn wide_table(mono: &[f32], sample_rate: u32) -> Vec<(String, f32)> {
    let frame_len = ((sample_rate as f64 * FRAME_SECS) as usize).max(2);
    let hop = ((sample_rate as f64 * HOP_SECS) as usize).max(1);
    let fft_len = frame_len.next_power_of_two();
    let num_bins = fft_len / 2 + 1;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_len);
    let window = hamming(frame_len);
    let filterbank = mel_filterbank(NUM_BANDS, num_bins, sample_rate);

    let mut rms = Vec::new();
    let mut zcr = Vec::new();
    let mut band_frames: Vec<Vec<f32>> = Vec::new();
    let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_len];

    for start in (0..mono.len()).step_by(hop) {
        let frame = &mono[start..(start + frame_len).min(mono.len())];

        let energy: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        rms.push(energy.sqrt());
        zcr.push(zero_crossing_rate(frame));

        for (i, slot) in buffer.iter_mut().enumerate() {
            let windowed = frame.get(i).map(|&s| s * window[i]).unwrap_or(0.0);
            *slot = Complex::new(windowed, 0.0);
        }
        fft.process(&mut buffer);
        let power: Vec<f32> = buffer[..num_bins].iter().map(|c| c.norm_sqr()).collect();

        band_frames.push(
            filterbank
                .iter()
                .map(|filter| filter.iter().zip(&power).map(|(w, p)| w * p).sum())
                .collect(),
        );
    }

    let audspec: Vec<f32> = band_frames
        .iter()
        .map(|bands| bands.iter().map(|b| b.abs()).sum())
        .collect();

    let rasta_frames = rasta_filter(&band_frames);
    let audspec_rasta: Vec<f32> = rasta_frames
        .iter()
        .map(|bands| bands.iter().map(|b| b.abs()).sum())
        .collect();

    let mut contours: Vec<(String, Vec<f32>)> = vec![
        ("audspec_lengthL1norm_sma".into(), smooth(&audspec)),
        ("audspecRasta_lengthL1norm_sma".into(), smooth(&audspec_rasta)),
        ("pcm_RMSenergy_sma".into(), smooth(&rms)),
        ("pcm_zcr_sma".into(), smooth(&zcr)),
    ];
    let deltas: Vec<(String, Vec<f32>)> = contours
        .iter()
        .map(|(name, values)| (format!("{name}_de"), delta(values)))
        .collect();
    contours.extend(deltas);
    for band in 0..3 {
        let trajectory: Vec<f32> = rasta_frames.iter().map(|bands| bands[band]).collect();
        contours.push((format!("audSpec_Rfilt_sma[{band}]"), smooth(&trajectory)));
    }

    let mut columns = Vec::with_capacity(contours.len() * 9);
    for (name, values) in &contours {
        for (suffix, value) in functionals(values) {
            columns.push((format!("{name}_{suffix}"), value));
        }
    }
    columns
}

/// Projects a wide feature table onto [`FEATURE_NAMES`] by substring match.
/// The first column (in extractor output order) whose name contains the
/// schema entry wins; misses are substituted with 0.0 and logged.
pub(crate) fn project(columns: &[(String, f32)]) -> Array1<f32> {
    let mut out = Vec::with_capacity(FEATURE_NAMES.len());
    for target in FEATURE_NAMES {
        match columns.iter().find(|(name, _)| name.contains(target)) {
            Some((_, value)) => out.push(*value),
            None => {
                tracing::warn!(feature = target, "feature not found, substituting 0.0");
                out.push(0.0);
            }
        }
    }
    Array1::from_vec(out)
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

fn hamming(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32).cos()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters spaced evenly on the mel scale, `num_bands x num_bins`.
fn mel_filterbank(num_bands: usize, num_bins: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let nyquist = sample_rate as f32 / 2.0;
    let max_mel = hz_to_mel(nyquist);

    let centers: Vec<usize> = (0..num_bands + 2)
        .map(|i| {
            let hz = mel_to_hz(max_mel * i as f32 / (num_bands + 1) as f32);
            ((hz / nyquist) * (num_bins - 1) as f32).round() as usize
        })
        .collect();

    (0..num_bands)
        .map(|band| {
            let (left, center, right) = (centers[band], centers[band + 1], centers[band + 2]);
            let mut filter = vec![0.0; num_bins];
            for bin in left..=right.min(num_bins - 1) {
                filter[bin] = if bin <= center {
                    if center == left {
                        1.0
                    } else {
                        (bin - left) as f32 / (center - left) as f32
                    }
                } else if right == center {
                    1.0
                } else {
                    (right - bin) as f32 / (right - center) as f32
                };
            }
            filter
        })
        .collect()
}

/// RASTA band-pass filter over the log band-energy trajectories. Transfer
/// function 0.1 * (2 + z^-1 - z^-3 - 2 z^-4) / (1 - 0.98 z^-1), zero-primed.
fn rasta_filter(band_frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    if band_frames.is_empty() {
        return Vec::new();
    }
    let num_bands = band_frames[0].len();
    let num_frames = band_frames.len();
    let mut out = vec![vec![0.0f32; num_bands]; num_frames];

    for band in 0..num_bands {
        let log_energy: Vec<f32> = band_frames
            .iter()
            .map(|bands| (bands[band] + 1e-6).ln())
            .collect();
        let x = |t: isize| -> f32 {
            if t < 0 {
                0.0
            } else {
                log_energy[t as usize]
            }
        };
        let mut previous = 0.0f32;
        for t in 0..num_frames {
            let t = t as isize;
            let fir = 2.0 * x(t) + x(t - 1) - x(t - 3) - 2.0 * x(t - 4);
            let y = 0.98 * previous + 0.1 * fir;
            out[t as usize][band] = y;
            previous = y;
        }
    }
    out
}

/// Centered 3-frame moving average.
fn smooth(values: &[f32]) -> Vec<f32> {
    if values.len() < 3 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 2).min(values.len());
            values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

/// First-order difference, same length as the input.
fn delta(values: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Functional statistics over one contour.
fn functionals(values: &[f32]) -> Vec<(&'static str, f32)> {
    let n = values.len();
    if n == 0 {
        return vec![
            ("amean", 0.0),
            ("stddev", 0.0),
            ("skewness", 0.0),
            ("kurtosis", 0.0),
            ("min", 0.0),
            ("max", 0.0),
            ("meanSegLen", 0.0),
            ("maxSegLen", 0.0),
            ("risetime", 0.0),
        ];
    }

    let mean = values.iter().sum::<f32>() / n as f32;
    let moment = |p: i32| values.iter().map(|v| (v - mean).powi(p)).sum::<f32>() / n as f32;
    let variance = moment(2);
    let stddev = variance.sqrt();
    let (skewness, kurtosis) = if stddev > 1e-12 {
        (moment(3) / stddev.powi(3), moment(4) / stddev.powi(4))
    } else {
        (0.0, 0.0)
    };

    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    // Lengths of maximal runs above the contour mean, in seconds.
    let mut seg_lengths: Vec<usize> = Vec::new();
    let mut run = 0usize;
    for &v in values {
        if v > mean {
            run += 1;
        } else if run > 0 {
            seg_lengths.push(run);
            run = 0;
        }
    }
    if run > 0 {
        seg_lengths.push(run);
    }
    let frames_to_secs = |frames: usize| frames as f32 * HOP_SECS as f32;
    let mean_seg = if seg_lengths.is_empty() {
        0.0
    } else {
        frames_to_secs(seg_lengths.iter().sum::<usize>()) / seg_lengths.len() as f32
    };
    let max_seg = frames_to_secs(seg_lengths.iter().copied().max().unwrap_or(0));

    let risetime = if n < 2 {
        0.0
    } else {
        values.windows(2).filter(|pair| pair[1] > pair[0]).count() as f32 / (n - 1) as f32
    };

    vec![
        ("amean", mean),
        ("stddev", stddev),
        ("skewness", skewness),
        ("kurtosis", kurtosis),
        ("min", min),
        ("max", max),
        ("meanSegLen", mean_seg),
        ("maxSegLen", max_seg),
        ("risetime", risetime),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn schema_names_are_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_NAMES.len());
    }

    #[test]
    fn projection_has_schema_length_and_zero_fills() {
        let columns = vec![("pcm_zcr_sma_stddev".to_string(), 0.25f32)];
        let vector = project(&columns);
        assert_eq!(vector.len(), FEATURE_NAMES.len());

        let target = FEATURE_NAMES
            .iter()
            .position(|n| *n == "pcm_zcr_sma_stddev")
            .unwrap();
        assert_relative_eq!(vector[target], 0.25);
        assert_relative_eq!(vector[0], 0.0);
    }

    #[test]
    fn projection_takes_first_match_in_column_order() {
        let columns = vec![
            ("prefix_pcm_zcr_sma_stddev_suffix".to_string(), 1.0f32),
            ("pcm_zcr_sma_stddev".to_string(), 2.0f32),
        ];
        let vector = project(&columns);
        let target = FEATURE_NAMES
            .iter()
            .position(|n| *n == "pcm_zcr_sma_stddev")
            .unwrap();
        assert_relative_eq!(vector[target], 1.0);
    }

    #[test]
    fn delta_targets_do_not_match_plain_columns() {
        // "..._sma_de_stddev" must not satisfy the "..._sma_stddev" entry.
        let columns = vec![(
            "audspec_lengthL1norm_sma_de_stddev".to_string(),
            3.0f32,
        )];
        let vector = project(&columns);
        let plain = FEATURE_NAMES
            .iter()
            .position(|n| *n == "audspec_lengthL1norm_sma_stddev")
            .unwrap();
        let de = FEATURE_NAMES
            .iter()
            .position(|n| *n == "audspec_lengthL1norm_sma_de_stddev")
            .unwrap();
        assert_relative_eq!(vector[plain], 0.0);
        assert_relative_eq!(vector[de], 3.0);
    }

    #[test]
    fn wide_table_covers_the_whole_schema() {
        let sample_rate = 16000u32;
        let mono: Vec<f32> = (0..sample_rate as usize * 2)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5
                    + (t * 3.0 * 2.0 * std::f32::consts::PI).sin() * 0.2
            })
            .collect();
        let columns = wide_table(&mono, sample_rate);
        for target in FEATURE_NAMES {
            assert!(
                columns.iter().any(|(name, _)| name.contains(target)),
                "no column matches {target}"
            );
        }
    }

    #[test]
    fn extract_features_returns_finite_schema_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..32000)
            .map(|i| {
                let t = i as f32 / 16000.0;
                ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16
            })
            .collect();
        crate::wav::write_wav(&path, &samples, spec).unwrap();

        let vector = extract_features(&path).unwrap();
        assert_eq!(vector.len(), FEATURE_NAMES.len());
        assert!(vector.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn functionals_on_constant_contour_are_degenerate() {
        let values = vec![1.0f32; 100];
        let stats: std::collections::HashMap<_, _> = functionals(&values).into_iter().collect();
        assert_relative_eq!(stats["stddev"], 0.0);
        assert_relative_eq!(stats["skewness"], 0.0);
        assert_relative_eq!(stats["risetime"], 0.0);
        // Nothing exceeds the mean, so there are no segments.
        assert_relative_eq!(stats["maxSegLen"], 0.0);
    }

    #[test]
    fn empty_segment_is_a_feature_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        crate::wav::write_wav(&path, &[], spec).unwrap();

        let err = extract_features(&path).unwrap_err();
        assert!(matches!(err, Error::FeatureExtraction { .. }));
    }
}

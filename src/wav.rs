use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Reads a 16-bit PCM WAV file, returning interleaved samples and the spec.
pub fn read_wav(path: &Path) -> hound::Result<(Vec<i16>, WavSpec)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample > 16 {
        return Err(hound::Error::Unsupported);
    }
    let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;

    Ok((samples, spec))
}

/// Writes interleaved samples as a WAV file with the given spec.
pub fn write_wav(path: &Path, samples: &[i16], spec: WavSpec) -> hound::Result<()> {
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..16000).map(|i| (i % 128) as i16).collect();

        write_wav(&path, &samples, spec()).unwrap();
        let (read, read_spec) = read_wav(&path).unwrap();

        assert_eq!(read, samples);
        assert_eq!(read_spec.sample_rate, 16000);
        assert_eq!(read_spec.channels, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_wav(&dir.path().join("nope.wav")).is_err());
    }
}

//! WAV file loading for offline runs and tests.
//!
//! Decodes a WAV file into the mono f32 stream the pipeline consumes,
//! downmixing channels and linearly resampling to the target rate.

use crate::error::{Result, VoxlogError};
use std::path::Path;

/// Load a WAV file as mono f32 samples at `target_rate`.
///
/// Accepts 16-bit integer and 32-bit float WAV data, any channel count.
///
/// # Errors
/// Returns `VoxlogError::AudioCapture` for unreadable or unsupported files.
pub fn load_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path).map_err(|e| VoxlogError::AudioCapture {
        message: format!("Failed to open WAV file {}: {}", path.display(), e),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample != 16 {
                return Err(VoxlogError::AudioCapture {
                    message: format!(
                        "Unsupported WAV bit depth: {} (expected 16)",
                        spec.bits_per_sample
                    ),
                });
            }
            reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| VoxlogError::AudioCapture {
                    message: format!("Failed to decode WAV samples: {}", e),
                })?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VoxlogError::AudioCapture {
                message: format!("Failed to decode WAV samples: {}", e),
            })?,
    };

    let mono: Vec<f32> = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(resample(&mono, spec.sample_rate, target_rate))
}

/// Linear-interpolation resampler.
///
/// Adequate for speech input; returns the input untouched when rates match.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, samples: &[i16], channels: u16, rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn load_mono_16khz_passthrough() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, &[0, 16384, -16384, 32767], 1, 16000);

        let samples = load_wav(&path, 16000).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 0.01);
        assert!((samples[2] + 0.5).abs() < 0.01);
    }

    #[test]
    fn load_stereo_downmixes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        // Two frames: (16384, 0) and (-16384, 0)
        write_wav(&path, &[16384, 0, -16384, 0], 2, 16000);

        let samples = load_wav(&path, 16000).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.25).abs() < 0.01);
        assert!((samples[1] + 0.25).abs() < 0.01);
    }

    #[test]
    fn load_resamples_to_target_rate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hi.wav");
        write_wav(&path, &vec![1000i16; 32000], 1, 32000);

        let samples = load_wav(&path, 16000).unwrap();
        // 1 second at 32 kHz → ~1 second at 16 kHz
        assert!((samples.len() as i64 - 16000).abs() <= 1);
    }

    #[test]
    fn load_missing_file_errors() {
        let result = load_wav(Path::new("/nonexistent/file.wav"), 16000);
        assert!(matches!(result, Err(VoxlogError::AudioCapture { .. })));
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_halves_length_for_double_rate() {
        let samples = vec![0.5; 1000];
        let out = resample(&samples, 32000, 16000);
        assert_eq!(out.len(), 500);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn resample_empty_is_empty() {
        assert!(resample(&[], 32000, 16000).is_empty());
    }
}

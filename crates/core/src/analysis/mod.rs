use std::{f32::consts::PI, fmt};

use realfft::{num_complex::Complex32, RealFftPlanner};
use serde::Serialize;

use crate::{Result, SampleBuffer, WaveLabError};

/// Longest span fed into the FFT. Longer buffers are analysed from the start.
const MAX_FFT_SECONDS: f64 = 1.0;

/// Offline measurements of a synthesized buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferSummary {
    pub sample_count: usize,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub rms: f32,
    pub peak: f32,
    /// Frequency of the strongest spectral bin.
    pub dominant_frequency_hz: f32,
    /// Magnitude-weighted mean frequency of the spectrum.
    pub spectral_centroid_hz: f32,
}

impl fmt::Display for BufferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples @ {} Hz ({:.3} s), rms {:.3}, peak {:.3}, dominant {:.1} Hz",
            self.sample_count,
            self.sample_rate,
            self.duration_seconds,
            self.rms,
            self.peak,
            self.dominant_frequency_hz
        )
    }
}

/// Measures level and spectral content of `buffer`.
pub fn summarize(buffer: &SampleBuffer) -> Result<BufferSummary> {
    let samples = buffer.samples();
    if samples.len() < 2 {
        return Err(WaveLabError::invalid_param(
            "buffer",
            "analysis requires at least two samples",
        ));
    }

    let window_len = samples
        .len()
        .min((buffer.sample_rate() as f64 * MAX_FFT_SECONDS) as usize)
        .max(2);
    let spectrum = magnitude_spectrum(&samples[..window_len])?;
    let bin_hz = buffer.sample_rate() as f32 / window_len as f32;

    // Bin 0 holds the DC offset, which is not a frequency of interest.
    let dominant_bin = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, _)| index)
        .unwrap_or(0);

    let magnitude_sum: f32 = spectrum.iter().sum();
    let spectral_centroid_hz = if magnitude_sum <= f32::EPSILON {
        0.0
    } else {
        spectrum
            .iter()
            .enumerate()
            .map(|(index, magnitude)| magnitude * index as f32 * bin_hz)
            .sum::<f32>()
            / magnitude_sum
    };

    Ok(BufferSummary {
        sample_count: samples.len(),
        sample_rate: buffer.sample_rate(),
        duration_seconds: buffer.duration_seconds(),
        rms: compute_rms(samples),
        peak: samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs())),
        dominant_frequency_hz: dominant_bin as f32 * bin_hz,
        spectral_centroid_hz,
    })
}

fn magnitude_spectrum(samples: &[f32]) -> Result<Vec<f32>> {
    let len = samples.len();
    let mut planner = RealFftPlanner::<f32>::new();
    let plan = planner.plan_fft_forward(len);
    let mut input = plan.make_input_vec();
    let mut spectrum: Vec<Complex32> = plan.make_output_vec();
    let mut scratch = plan.make_scratch_vec();

    for (index, (slot, value)) in input.iter_mut().zip(samples).enumerate() {
        *slot = *value * hann_value(index, len);
    }

    plan.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
        .map_err(|e| WaveLabError::msg(format!("fft failed: {e}")))?;

    Ok(spectrum.iter().map(|bin| bin.norm()).collect())
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{synthesize, WaveformFamily, WaveformRequest};

    fn summary(family: WaveformFamily, frequency: f64) -> BufferSummary {
        let request = WaveformRequest::new(family, frequency, 0.5, 44_100).unwrap();
        summarize(&synthesize(&request)).unwrap()
    }

    #[test]
    fn finds_sine_fundamental() {
        let summary = summary(WaveformFamily::Sine, 440.0);

        assert_eq!(summary.sample_count, 22_050);
        assert!((summary.dominant_frequency_hz - 440.0).abs() <= 2.0);
        assert!((summary.rms - 0.5 / 2.0_f32.sqrt()).abs() < 1e-3);
        assert!((summary.peak - 0.5).abs() < 1e-3);
    }

    #[test]
    fn square_has_full_rms_and_fundamental() {
        let summary = summary(WaveformFamily::Square, 200.0);

        assert!((summary.rms - 0.5).abs() < 1e-6);
        assert!((summary.dominant_frequency_hz - 200.0).abs() <= 2.0);
        // Odd harmonics pull the centroid above the fundamental.
        assert!(summary.spectral_centroid_hz > 200.0);
    }

    #[test]
    fn rejects_tiny_buffers() {
        let request = WaveformRequest::new(WaveformFamily::Sine, 440.0, 1.0, 1).unwrap();
        assert!(summarize(&synthesize(&request)).is_err());
    }

    #[test]
    fn summary_serializes_for_inspection() {
        let summary = summary(WaveformFamily::Sine, 440.0);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["sample_count"], 22_050);
        assert_eq!(json["sample_rate"], 44_100);
        assert!(json["dominant_frequency_hz"].as_f64().unwrap() > 430.0);
    }
}

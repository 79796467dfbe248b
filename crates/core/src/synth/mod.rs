//! Direct synthesis of the four fundamental waveforms.
//!
//! Synthesis is a pure function of a [`WaveformRequest`]: the same request
//! always yields the same [`SampleBuffer`].

use std::{f64::consts::PI, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Result, WaveLabError};

/// Default peak amplitude of synthesized samples.
pub const AMPLITUDE: f32 = 0.5;

/// Longest buffer a single request may describe.
pub const MAX_DURATION_SECONDS: f64 = 600.0;

/// Upper bound on samples per buffer: ten minutes at 192 kHz.
pub const MAX_SAMPLE_COUNT: usize = 115_200_000;

/// Closed set of supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformFamily {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl WaveformFamily {
    pub const ALL: [WaveformFamily; 4] = [
        WaveformFamily::Sine,
        WaveformFamily::Square,
        WaveformFamily::Triangle,
        WaveformFamily::Sawtooth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "Sine",
            Self::Square => "Square",
            Self::Triangle => "Triangle",
            Self::Sawtooth => "Sawtooth",
        }
    }

    /// Unit-amplitude value of the waveform at time `t` for frequency `f`.
    fn shape(self, frequency: f64, t: f64) -> f64 {
        let phase = 2.0 * PI * frequency * t;
        match self {
            Self::Sine => phase.sin(),
            // sin == 0 at zero crossings maps to the positive level so the
            // square never emits a silent sample.
            Self::Square => {
                if phase.sin() < 0.0 {
                    -1.0
                } else {
                    1.0
                }
            }
            Self::Triangle => (2.0 / PI) * phase.sin().asin(),
            Self::Sawtooth => {
                let cycles = t * frequency;
                2.0 * (cycles - (0.5 + cycles).floor())
            }
        }
    }
}

impl fmt::Display for WaveformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaveformFamily {
    type Err = WaveLabError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WaveLabError::UnknownWaveform(wanted.to_string()))
    }
}

/// Parameters of a single synthesis call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformRequest {
    pub family: WaveformFamily,
    pub frequency_hz: f64,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub amplitude: f32,
}

impl WaveformRequest {
    /// Builds a request at the default amplitude after checking every
    /// numeric parameter is positive and finite and that the buffer stays
    /// within [`MAX_DURATION_SECONDS`] and [`MAX_SAMPLE_COUNT`].
    pub fn new(
        family: WaveformFamily,
        frequency_hz: f64,
        duration_seconds: f64,
        sample_rate: u32,
    ) -> Result<Self> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(WaveLabError::NonPositiveFrequency {
                value: frequency_hz,
            });
        }
        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return Err(WaveLabError::invalid_param(
                "duration_seconds",
                format!("{duration_seconds} is not a positive duration"),
            ));
        }
        if duration_seconds > MAX_DURATION_SECONDS {
            return Err(WaveLabError::invalid_param(
                "duration_seconds",
                format!("{duration_seconds} exceeds the {MAX_DURATION_SECONDS} s limit"),
            ));
        }
        if sample_rate == 0 {
            return Err(WaveLabError::invalid_param(
                "sample_rate",
                "must be greater than zero",
            ));
        }
        check_sample_count(sample_rate, duration_seconds)?;
        Ok(Self {
            family,
            frequency_hz,
            duration_seconds,
            sample_rate,
            amplitude: AMPLITUDE,
        })
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Number of samples the request produces.
    pub fn sample_count(&self) -> usize {
        (self.sample_rate as f64 * self.duration_seconds).round() as usize
    }
}

/// Rejects buffers longer than [`MAX_SAMPLE_COUNT`] before any cast to
/// `usize` can saturate.
pub(crate) fn check_sample_count(sample_rate: u32, duration_seconds: f64) -> Result<()> {
    let count = (sample_rate as f64 * duration_seconds).round();
    if count > MAX_SAMPLE_COUNT as f64 {
        return Err(WaveLabError::invalid_param(
            "sample_rate",
            format!("{sample_rate} Hz for {duration_seconds} s exceeds {MAX_SAMPLE_COUNT} samples"),
        ));
    }
    Ok(())
}

/// Synthesized mono samples together with their timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    duration_seconds: f64,
}

impl SampleBuffer {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Spacing between consecutive samples on the time axis.
    pub fn step_seconds(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.duration_seconds / self.samples.len() as f64
        }
    }

    /// Sample times over the half-open interval `[0, duration)`.
    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        let step = self.step_seconds();
        (0..self.samples.len()).map(move |index| index as f64 * step)
    }

    /// Consecutive slices of at most `frames` samples.
    pub fn chunks(&self, frames: usize) -> std::slice::Chunks<'_, f32> {
        self.samples.chunks(frames.max(1))
    }
}

/// Produces the sample buffer described by `request`.
///
/// Samples cover `[0, duration)` with the end point excluded so that looping
/// the buffer never repeats its first sample.
pub fn synthesize(request: &WaveformRequest) -> SampleBuffer {
    let count = request.sample_count();
    let step = if count == 0 {
        0.0
    } else {
        request.duration_seconds / count as f64
    };
    let amplitude = request.amplitude as f64;

    let samples = (0..count)
        .map(|index| {
            let t = index as f64 * step;
            (amplitude * request.family.shape(request.frequency_hz, t)) as f32
        })
        .collect();

    SampleBuffer {
        samples,
        sample_rate: request.sample_rate,
        duration_seconds: request.duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(family: WaveformFamily, frequency: f64) -> WaveformRequest {
        WaveformRequest::new(family, frequency, 0.05, 44_100).unwrap()
    }

    #[test]
    fn sine_scenario_matches_expected_shape() {
        let request = WaveformRequest::new(WaveformFamily::Sine, 440.0, 5.0, 44_100).unwrap();
        let buffer = synthesize(&request);

        assert_eq!(buffer.len(), 220_500);
        assert!(buffer.samples()[0].abs() < 1e-6);

        // t = 1 / (4 * 440) lands between samples 25 and 26.
        let peak_index = (44_100.0_f64 / (4.0 * 440.0)).round() as usize;
        assert!((buffer.samples()[peak_index] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn every_family_respects_length_and_bounds() {
        for family in WaveformFamily::ALL {
            for frequency in [1.0, 55.5, 440.0, 9_000.0] {
                let request = request(family, frequency);
                let buffer = synthesize(&request);

                assert_eq!(buffer.len(), request.sample_count());
                assert!(
                    buffer.samples().iter().all(|s| (-0.5..=0.5).contains(s)),
                    "{family} at {frequency} Hz left [-0.5, 0.5]"
                );
            }
        }
    }

    #[test]
    fn length_rounds_fractional_counts() {
        let request = WaveformRequest::new(WaveformFamily::Sine, 100.0, 0.0106, 1000).unwrap();
        assert_eq!(synthesize(&request).len(), 11);
    }

    #[test]
    fn square_never_emits_zero() {
        let buffer = synthesize(&request(WaveformFamily::Square, 440.0));

        assert_eq!(buffer.samples()[0], 0.5);
        assert!(buffer.samples().iter().all(|s| *s == 0.5 || *s == -0.5));
        assert!(buffer.samples().contains(&-0.5));
    }

    #[test]
    fn sawtooth_rises_within_each_period() {
        let buffer = synthesize(&request(WaveformFamily::Sawtooth, 100.0));
        let mut resets = 0;

        for pair in buffer.samples().windows(2) {
            if pair[1] < pair[0] {
                // Only the jump back at a period boundary may fall.
                assert!(pair[0] - pair[1] > 0.9);
                resets += 1;
            }
        }

        // 0.05 s of 100 Hz spans five periods starting mid-ramp.
        assert_eq!(resets, 5);
    }

    #[test]
    fn triangle_reaches_both_peaks() {
        let buffer = synthesize(&request(WaveformFamily::Triangle, 100.0));
        let max = buffer.samples().iter().cloned().fold(f32::MIN, f32::max);
        let min = buffer.samples().iter().cloned().fold(f32::MAX, f32::min);

        assert!(max > 0.49 && max <= 0.5);
        assert!(min < -0.49 && min >= -0.5);
    }

    #[test]
    fn synthesis_is_deterministic() {
        for family in WaveformFamily::ALL {
            let request = request(family, 261.63);
            assert_eq!(synthesize(&request), synthesize(&request));
        }
    }

    #[test]
    fn timestamps_exclude_end_point() {
        let buffer = synthesize(&request(WaveformFamily::Sine, 440.0));
        let stamps: Vec<f64> = buffer.timestamps().collect();

        assert_eq!(stamps.len(), buffer.len());
        assert_eq!(stamps[0], 0.0);
        assert!(*stamps.last().unwrap() < buffer.duration_seconds());
    }

    #[test]
    fn rejects_non_positive_frequency() {
        for frequency in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(WaveformRequest::new(WaveformFamily::Sine, frequency, 1.0, 44_100).is_err());
        }
    }

    #[test]
    fn rejects_oversized_buffers() {
        for duration in [MAX_DURATION_SECONDS + 1.0, 1e15, 1e20] {
            let err = WaveformRequest::new(WaveformFamily::Sine, 440.0, duration, 44_100).unwrap_err();
            assert!(matches!(
                err,
                WaveLabError::InvalidParameter { name: "duration_seconds", .. }
            ));
        }

        let err = WaveformRequest::new(WaveformFamily::Sine, 440.0, 60.0, u32::MAX).unwrap_err();
        assert!(matches!(err, WaveLabError::InvalidParameter { name: "sample_rate", .. }));

        let longest =
            WaveformRequest::new(WaveformFamily::Sine, 440.0, MAX_DURATION_SECONDS, 44_100).unwrap();
        assert_eq!(longest.sample_count(), 26_460_000);
    }

    #[test]
    fn parses_family_names_case_insensitively() {
        assert_eq!("square".parse::<WaveformFamily>().unwrap(), WaveformFamily::Square);
        assert_eq!(" SawTooth ".parse::<WaveformFamily>().unwrap(), WaveformFamily::Sawtooth);
        assert!("noise".parse::<WaveformFamily>().is_err());
    }
}

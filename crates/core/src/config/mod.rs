use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    synth::{check_sample_count, MAX_DURATION_SECONDS},
    Result, WaveLabError, WaveformFamily,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub preview: PreviewConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(WaveLabError::invalid_param(
                "audio.sample_rate",
                "must be greater than zero",
            ));
        }
        if self.audio.chunk_frames == 0 {
            return Err(WaveLabError::invalid_param(
                "audio.chunk_frames",
                "must be greater than zero",
            ));
        }
        if !(self.audio.amplitude > 0.0 && self.audio.amplitude <= 1.0) {
            return Err(WaveLabError::invalid_param(
                "audio.amplitude",
                format!("{} is outside (0, 1]", self.audio.amplitude),
            ));
        }
        if !(self.playback.duration_seconds.is_finite() && self.playback.duration_seconds > 0.0) {
            return Err(WaveLabError::invalid_param(
                "playback.duration_seconds",
                "must be a positive number of seconds",
            ));
        }
        if self.playback.duration_seconds > MAX_DURATION_SECONDS {
            return Err(WaveLabError::invalid_param(
                "playback.duration_seconds",
                format!("must not exceed {MAX_DURATION_SECONDS} seconds"),
            ));
        }
        check_sample_count(self.audio.sample_rate, self.playback.duration_seconds)?;
        if !(self.playback.default_frequency_hz.is_finite()
            && self.playback.default_frequency_hz > 0.0)
        {
            return Err(WaveLabError::invalid_param(
                "playback.default_frequency_hz",
                "must be a positive frequency",
            ));
        }
        let preview = &self.preview;
        if !(preview.min_seconds > 0.0 && preview.min_seconds <= preview.max_seconds) {
            return Err(WaveLabError::invalid_param(
                "preview",
                "min_seconds must be positive and not larger than max_seconds",
            ));
        }
        if !(preview.periods > 0.0) {
            return Err(WaveLabError::invalid_param(
                "preview.periods",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames handed to the output stream per write.
    pub chunk_frames: usize,
    /// Peak amplitude of synthesized waveforms.
    pub amplitude: f32,
    /// Output device name; `None` selects the host default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_frames: 1024,
            amplitude: crate::synth::AMPLITUDE,
            device: None,
        }
    }
}

/// Session and worker lifecycle settings.
///
/// Both join bounds are best-effort: when a previous worker does not exit in
/// time the new stream is opened anyway, so two workers may briefly contend
/// for the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub duration_seconds: f64,
    pub default_frequency_hz: f64,
    pub default_waveform: WaveformFamily,
    /// Wait for the previous worker when Play replaces a session.
    pub replay_join_timeout_ms: u64,
    /// Wait for the active worker when the application closes.
    pub shutdown_join_timeout_ms: u64,
}

impl PlaybackConfig {
    pub fn replay_join_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_join_timeout_ms)
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 5.0,
            default_frequency_hz: 440.0,
            default_waveform: WaveformFamily::Sine,
            replay_join_timeout_ms: 500,
            shutdown_join_timeout_ms: 1000,
        }
    }
}

/// Bounds of the on-screen preview window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub periods: f64,
    pub min_seconds: f64,
    pub max_seconds: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            periods: 3.0,
            min_seconds: 0.001,
            max_seconds: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.chunk_frames, 1024);
        assert_eq!(config.playback.replay_join_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "audio": { "sample_rate": 48000 } }"#).unwrap();

        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.chunk_frames, 1024);
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn parses_waveform_names() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "playback": { "default_waveform": "sawtooth" } }"#)
                .unwrap();
        assert_eq!(config.playback.default_waveform, WaveformFamily::Sawtooth);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let mut config = AppConfig::default();
        config.audio.chunk_frames = 0;

        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("chunk_frames"));
    }

    #[test]
    fn rejects_unbounded_duration() {
        let mut config = AppConfig::default();
        config.playback.duration_seconds = 1e20;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            WaveLabError::InvalidParameter { name: "playback.duration_seconds", .. }
        ));

        config.playback.duration_seconds = 60.0;
        config.audio.sample_rate = 4_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, WaveLabError::Io(_)));
    }
}

use std::fmt;

use crate::{config::PreviewConfig, synthesize, Result, WaveformFamily, WaveformRequest};

/// Short synthesized segment used only for on-screen plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewPlot {
    pub family: WaveformFamily,
    pub frequency_hz: f64,
    pub timestamps: Vec<f64>,
    pub values: Vec<f32>,
    /// Upper bound of the time axis; equals the preview duration.
    pub x_upper_bound: f64,
}

/// Length of the preview window: a few periods, clamped to the configured
/// bounds so very low and very high frequencies stay readable.
pub fn preview_duration(frequency_hz: f64, config: &PreviewConfig) -> f64 {
    (config.periods / frequency_hz)
        .min(config.max_seconds)
        .max(config.min_seconds)
}

/// Synthesizes the preview segment for a validated frequency.
pub fn build_preview(
    family: WaveformFamily,
    frequency_hz: f64,
    sample_rate: u32,
    amplitude: f32,
    config: &PreviewConfig,
) -> Result<PreviewPlot> {
    let duration = preview_duration(frequency_hz, config);
    let request =
        WaveformRequest::new(family, frequency_hz, duration, sample_rate)?.with_amplitude(amplitude);
    let buffer = synthesize(&request);

    Ok(PreviewPlot {
        family,
        frequency_hz,
        timestamps: buffer.timestamps().collect(),
        values: buffer.samples().to_vec(),
        x_upper_bound: duration,
    })
}

/// Label shown on the Play/Stop toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLabel {
    Play,
    Stop,
}

impl fmt::Display for ButtonLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => f.write_str("Play"),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    InputError,
    AudioError,
}

/// Blocking, user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn input_error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::InputError,
            message: message.into(),
        }
    }

    pub fn audio_error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::AudioError,
            message: message.into(),
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            NoticeKind::InputError => "Input Error",
            NoticeKind::AudioError => "Audio Error",
        }
    }
}

/// Rendering collaborator driven from the UI thread.
///
/// Implementations own everything visual: clearing, axes, the curve itself
/// and repainting. The core only hands over data.
pub trait DisplayAdapter {
    fn draw_waveform(&mut self, plot: &PreviewPlot) -> Result<()>;

    /// Mirrors the controller's displayed state onto the toggle button.
    fn set_play_button(&mut self, label: ButtonLabel, enabled: bool);

    fn notify(&mut self, notice: &Notice);
}

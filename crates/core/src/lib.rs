//! Core library for the Waveform Lab generator and player.
//!
//! The crate synthesizes the four fundamental waveforms, previews them
//! through a pluggable display and streams them to an audio device from a
//! background worker. UI state is owned by a single event loop
//! ([`app::WaveformApp`]); the audio worker only shares a cancellation flag
//! with it and reports completion through the loop's event queue.

pub mod analysis;
pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod preview;
pub mod render;
pub mod synth;

pub use analysis::{summarize, BufferSummary};
pub use app::{parse_frequency, UiEvent, UserCommand, WaveformApp};
pub use audio::{AudioBackend, AudioSubsystem, OutputDevice, OutputStream, SilentDevice, StreamSpec};
pub use config::{AppConfig, AudioConfig, PlaybackConfig, PreviewConfig};
pub use error::{Result, WaveLabError};
pub use playback::{
    AudioWorker, CancelToken, PlaybackController, PlaybackOutcome, PlaybackSession,
    PlaybackState, SessionId, WorkerHandle,
};
pub use preview::{
    build_preview, preview_duration, ButtonLabel, DisplayAdapter, Notice, NoticeKind, PreviewPlot,
};
pub use render::TerminalDisplay;
pub use synth::{
    synthesize, SampleBuffer, WaveformFamily, WaveformRequest, AMPLITUDE, MAX_DURATION_SECONDS,
};

//! Single-threaded UI loop tying input, preview and playback together.
//!
//! Everything that mutates application state runs inside [`WaveformApp`] on
//! the thread that owns it. Other threads (input readers, audio workers)
//! only post [`UiEvent`]s onto its queue.

use std::{
    str::FromStr,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::{Duration, Instant},
};

use crate::{
    preview::{build_preview, DisplayAdapter, Notice},
    AppConfig, AudioSubsystem, PlaybackController, PlaybackOutcome, PlaybackState, Result,
    SessionId, WaveLabError, WaveformFamily,
};

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    SelectWaveform(WaveformFamily),
    /// Raw text of the frequency field; validated only when playing.
    SetFrequency(String),
    /// The Play/Stop toggle button.
    PlayStop,
    Play,
    Stop,
    Quit,
}

impl FromStr for UserCommand {
    type Err = WaveLabError;

    /// Parses one line of the text front end, e.g. `wave square`,
    /// `freq 880`, `play`, `stop`, `toggle` or `quit`.
    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "wave" | "waveform" | "w" if !rest.is_empty() => {
                Ok(Self::SelectWaveform(rest.parse()?))
            }
            "freq" | "frequency" | "f" if !rest.is_empty() => {
                Ok(Self::SetFrequency(rest.to_string()))
            }
            "" | "toggle" | "t" if rest.is_empty() => Ok(Self::PlayStop),
            "play" | "p" if rest.is_empty() => Ok(Self::Play),
            "stop" | "s" if rest.is_empty() => Ok(Self::Stop),
            "quit" | "q" | "exit" if rest.is_empty() => Ok(Self::Quit),
            _ => Err(WaveLabError::UnknownCommand(line.to_string())),
        }
    }
}

/// Messages processed by the UI loop, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Input(UserCommand),
    PlaybackFinished {
        session: SessionId,
        outcome: PlaybackOutcome,
    },
}

/// Parses the frequency field as a positive, finite number of hertz.
pub fn parse_frequency(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| WaveLabError::InvalidFrequency {
            input: trimmed.to_string(),
        })?;
    if !value.is_finite() {
        return Err(WaveLabError::InvalidFrequency {
            input: trimmed.to_string(),
        });
    }
    if value <= 0.0 {
        return Err(WaveLabError::NonPositiveFrequency { value });
    }
    Ok(value)
}

/// The waveform generator application.
pub struct WaveformApp<D: DisplayAdapter> {
    config: AppConfig,
    display: D,
    controller: PlaybackController,
    events_tx: Sender<UiEvent>,
    events_rx: Receiver<UiEvent>,
    family: WaveformFamily,
    frequency_text: String,
    closed: bool,
}

impl<D: DisplayAdapter> WaveformApp<D> {
    /// Builds the application around the result of acquiring the audio
    /// subsystem. A failed acquisition disables playback and is reported
    /// once; the preview keeps working.
    pub fn new(config: AppConfig, audio: Result<AudioSubsystem>, display: D) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let (audio, startup_notice) = match audio {
            Ok(audio) => (Some(audio), None),
            Err(err) => {
                tracing::warn!(%err, "audio subsystem unavailable, playback disabled");
                let notice = Notice::audio_error(format!(
                    "Could not initialize audio: {err}. Playback will be disabled."
                ));
                (None, Some(notice))
            }
        };

        let controller = PlaybackController::new(
            audio,
            config.audio.clone(),
            config.playback.clone(),
            events_tx.clone(),
        );
        let family = config.playback.default_waveform;
        let frequency_text = config.playback.default_frequency_hz.to_string();

        let mut app = Self {
            config,
            display,
            controller,
            events_tx,
            events_rx,
            family,
            frequency_text,
            closed: false,
        };
        if let Some(notice) = startup_notice {
            app.display.notify(&notice);
        }
        app.sync_button();
        app.refresh_preview();
        app
    }

    /// Handle for other threads to post events onto the UI queue.
    pub fn sender(&self) -> Sender<UiEvent> {
        self.events_tx.clone()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn family(&self) -> WaveformFamily {
        self.family
    }

    pub fn frequency_text(&self) -> &str {
        &self.frequency_text
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Processes one event. Returns `false` once the user asked to quit.
    pub fn handle_event(&mut self, event: UiEvent) -> bool {
        if self.closed {
            return false;
        }
        match event {
            UiEvent::Input(command) => self.handle_command(command),
            UiEvent::PlaybackFinished { session, outcome } => {
                if self.controller.on_worker_finished(session, &outcome) {
                    self.sync_button();
                }
                true
            }
        }
    }

    pub fn handle_command(&mut self, command: UserCommand) -> bool {
        tracing::debug!(?command, "handling command");
        match command {
            UserCommand::SelectWaveform(family) => {
                self.family = family;
                self.refresh_preview();
            }
            UserCommand::SetFrequency(text) => {
                self.frequency_text = text;
                self.refresh_preview();
            }
            UserCommand::PlayStop => match self.controller.state() {
                PlaybackState::Playing => self.stop(),
                PlaybackState::Idle => self.play(),
            },
            UserCommand::Play => self.play(),
            UserCommand::Stop => self.stop(),
            UserCommand::Quit => return false,
        }
        true
    }

    /// Blocks on the queue until a `Quit` command arrives, then closes the
    /// app. The app and its controller keep senders of their own, so the
    /// queue never disconnects while `run` is waiting; input sources post
    /// `Quit` when they end.
    pub fn run(&mut self) {
        while let Ok(event) = self.events_rx.recv() {
            if !self.handle_event(event) {
                break;
            }
        }
        self.close();
    }

    /// Handles every queued event without blocking. Returns `false` if one of
    /// them was a quit request.
    pub fn pump(&mut self) -> bool {
        while let Ok(event) = self.events_rx.try_recv() {
            if !self.handle_event(event) {
                return false;
            }
        }
        true
    }

    /// Processes events until playback is idle or `timeout` expires. Returns
    /// whether the app ended up idle.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.controller.state() == PlaybackState::Playing {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => {
                    if !self.handle_event(event) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.controller.state() == PlaybackState::Idle
    }

    /// Stops playback, waits for the worker within the shutdown bound and
    /// releases the audio subsystem. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::info!("closing application");
        self.controller.shutdown();
        self.closed = true;
    }

    fn play(&mut self) {
        if !self.controller.is_available() {
            self.display
                .notify(&Notice::audio_error("Audio output is not available."));
            return;
        }
        let frequency = match parse_frequency(&self.frequency_text) {
            Ok(frequency) => frequency,
            Err(err) => {
                tracing::info!(input = %self.frequency_text, "rejected frequency");
                self.display.notify(&Notice::input_error(err.to_string()));
                return;
            }
        };

        self.draw_preview(frequency);
        if let Err(err) = self.controller.play(self.family, frequency) {
            tracing::error!(%err, "failed to start playback");
            self.display.notify(&Notice::audio_error(err.to_string()));
        }
        self.sync_button();
    }

    fn stop(&mut self) {
        if self.controller.stop() {
            self.sync_button();
        }
    }

    fn refresh_preview(&mut self) {
        let frequency = parse_frequency(&self.frequency_text)
            .unwrap_or(self.config.playback.default_frequency_hz);
        self.draw_preview(frequency);
    }

    fn draw_preview(&mut self, frequency_hz: f64) {
        let plot = build_preview(
            self.family,
            frequency_hz,
            self.config.audio.sample_rate,
            self.config.audio.amplitude,
            &self.config.preview,
        );
        let drawn = plot.and_then(|plot| self.display.draw_waveform(&plot));
        if let Err(err) = drawn {
            tracing::warn!(%err, "failed to draw preview");
        }
    }

    fn sync_button(&mut self) {
        self.display.set_play_button(
            self.controller.displayed_label(),
            self.controller.is_available(),
        );
    }
}

impl<D: DisplayAdapter> Drop for WaveformApp<D> {
    fn drop(&mut self) {
        self.close();
    }
}

//! Play/stop lifecycle of a single audio session.
//!
//! The controller lives on the UI thread. Each play request synthesizes a
//! buffer and hands it to a fresh [`AudioWorker`] thread together with a
//! [`CancelToken`]; the cancellation flag is the only state both threads
//! touch. Workers report back by posting [`UiEvent::PlaybackFinished`] onto
//! the UI queue, never by mutating controller state directly.
//!
//! Replacing a session cancels the previous worker and waits a bounded time
//! for it to exit. If it does not, the new stream is opened anyway and the
//! old worker is kept as a straggler until it finishes, so two workers can
//! briefly write to the device at the same time.

mod worker;

use std::{
    sync::mpsc::Sender,
    time::{Duration, Instant},
};

pub use worker::{
    AudioWorker, CancelToken, PlaybackOutcome, PlaybackSession, SessionId, WorkerHandle,
};

use crate::{
    app::UiEvent,
    config::{AudioConfig, PlaybackConfig},
    preview::ButtonLabel,
    synthesize, AudioSubsystem, Result, WaveLabError, WaveformFamily, WaveformRequest,
};

/// State shown to the user. `Idle` displays "Play", `Playing` displays "Stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    family: WaveformFamily,
    frequency_hz: f64,
    cancel: CancelToken,
    worker: WorkerHandle,
}

#[derive(Debug)]
pub struct PlaybackController {
    audio: Option<AudioSubsystem>,
    audio_config: AudioConfig,
    playback_config: PlaybackConfig,
    events: Sender<UiEvent>,
    state: PlaybackState,
    current: Option<ActiveSession>,
    stragglers: Vec<WorkerHandle>,
    next_session: u64,
}

impl PlaybackController {
    /// Creates a controller. Without an audio subsystem every play request
    /// fails with [`WaveLabError::AudioUnavailable`].
    pub fn new(
        audio: Option<AudioSubsystem>,
        audio_config: AudioConfig,
        playback_config: PlaybackConfig,
        events: Sender<UiEvent>,
    ) -> Self {
        Self {
            audio,
            audio_config,
            playback_config,
            events,
            state: PlaybackState::Idle,
            current: None,
            stragglers: Vec::new(),
            next_session: 1,
        }
    }

    pub fn is_available(&self) -> bool {
        self.audio.is_some()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn displayed_label(&self) -> ButtonLabel {
        match self.state {
            PlaybackState::Idle => ButtonLabel::Play,
            PlaybackState::Playing => ButtonLabel::Stop,
        }
    }

    /// The most recent session, whether or not it is still playing.
    pub fn current_session(&self) -> Option<SessionId> {
        self.current.as_ref().map(|session| session.id)
    }

    pub fn current_request(&self) -> Option<(WaveformFamily, f64)> {
        self.current
            .as_ref()
            .map(|session| (session.family, session.frequency_hz))
    }

    /// Worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        let current = self
            .current
            .iter()
            .filter(|session| !session.worker.is_finished())
            .count();
        current + self.stragglers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Starts a new session, replacing any previous one.
    ///
    /// `frequency_hz` must already be validated; non-positive values are
    /// rejected without touching the current session.
    pub fn play(&mut self, family: WaveformFamily, frequency_hz: f64) -> Result<SessionId> {
        let device = self
            .audio
            .as_ref()
            .map(AudioSubsystem::device)
            .ok_or_else(|| WaveLabError::AudioUnavailable("playback is disabled".to_string()))?;

        let request = WaveformRequest::new(
            family,
            frequency_hz,
            self.playback_config.duration_seconds,
            self.audio_config.sample_rate,
        )?
        .with_amplitude(self.audio_config.amplitude);
        let buffer = synthesize(&request);

        self.retire_current(self.playback_config.replay_join_timeout());

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let cancel = CancelToken::new();
        let session = PlaybackSession {
            id,
            buffer,
            cancel: cancel.clone(),
        };

        let events = self.events.clone();
        let spawned = AudioWorker::new(device, self.audio_config.chunk_frames).spawn(
            session,
            move |session, outcome| {
                if events
                    .send(UiEvent::PlaybackFinished { session, outcome })
                    .is_err()
                {
                    tracing::debug!(%session, "UI queue closed before playback finished");
                }
            },
        );
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.state = PlaybackState::Idle;
                return Err(err);
            }
        };

        tracing::info!(session = %id, %family, frequency_hz, "playback started");
        self.current = Some(ActiveSession {
            id,
            family,
            frequency_hz,
            cancel,
            worker,
        });
        self.state = PlaybackState::Playing;
        Ok(id)
    }

    /// Signals the current worker and shows "Play" straight away; the worker
    /// stops at its next chunk boundary. Returns `false` when already idle.
    pub fn stop(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        if let Some(session) = &self.current {
            session.cancel.cancel();
            tracing::info!(session = %session.id, "playback stop requested");
        }
        self.state = PlaybackState::Idle;
        true
    }

    /// Reconciles state with a worker's completion. Only the current session
    /// can move the controller back to idle; stale sessions are ignored.
    /// Returns whether the displayed state changed.
    pub fn on_worker_finished(&mut self, session: SessionId, outcome: &PlaybackOutcome) -> bool {
        self.reap_stragglers();

        let is_current = self.current_session() == Some(session);
        if !is_current {
            tracing::debug!(%session, ?outcome, "ignoring completion of a replaced session");
            return false;
        }
        if let PlaybackOutcome::Failed(reason) = outcome {
            tracing::warn!(%session, %reason, "playback ended early");
        }
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Idle;
            return true;
        }
        false
    }

    /// Cancels everything, waits for workers within the shutdown bound and
    /// releases the audio subsystem. The bound covers all workers together,
    /// not each one. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.audio.is_none() && self.current.is_none() && self.stragglers.is_empty() {
            return;
        }
        self.state = PlaybackState::Idle;
        let timeout = self.playback_config.shutdown_join_timeout();
        let deadline = Instant::now() + timeout;
        if let Some(session) = self.current.take() {
            session.cancel.cancel();
            self.stragglers.push(session.worker);
        }
        for worker in &mut self.stragglers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !worker.join_timeout(remaining) {
                tracing::warn!(
                    session = %worker.session(),
                    ?timeout,
                    "audio worker did not terminate cleanly"
                );
            }
        }
        self.stragglers.retain(|worker| !worker.is_finished());

        if let Some(audio) = self.audio.take() {
            audio.release();
        }
    }

    fn retire_current(&mut self, timeout: Duration) {
        self.reap_stragglers();
        let Some(mut previous) = self.current.take() else {
            return;
        };
        previous.cancel.cancel();
        if !previous.worker.join_timeout(timeout) {
            tracing::warn!(
                session = %previous.id,
                ?timeout,
                "previous audio worker did not exit in time, continuing anyway"
            );
            self.stragglers.push(previous.worker);
        }
    }

    fn reap_stragglers(&mut self) {
        self.stragglers.retain_mut(|worker| {
            if worker.is_finished() {
                worker.join_timeout(Duration::ZERO);
                false
            } else {
                true
            }
        });
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

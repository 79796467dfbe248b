use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    audio::{OutputDevice, OutputStream, StreamSpec},
    Result, SampleBuffer,
};

/// Identifies one play request. Ids increase monotonically per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cooperative cancellation flag shared between the UI thread, which sets
/// it, and one worker, which polls it between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a worker's stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every chunk was written and played out.
    Finished,
    Cancelled,
    /// The device failed; the message is for logs only.
    Failed(String),
}

/// One play request's worth of state.
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub buffer: SampleBuffer,
    pub cancel: CancelToken,
}

/// Streams a sample buffer to an output device in fixed-size chunks.
pub struct AudioWorker {
    device: Arc<dyn OutputDevice>,
    chunk_frames: usize,
}

impl AudioWorker {
    pub fn new(device: Arc<dyn OutputDevice>, chunk_frames: usize) -> Self {
        Self {
            device,
            chunk_frames: chunk_frames.max(1),
        }
    }

    /// Streams `buffer` on the calling thread until it ends or `cancel` is
    /// set. The stream is stopped and closed on every exit path, and device
    /// failures are reported as [`PlaybackOutcome::Failed`].
    pub fn run(&self, buffer: &SampleBuffer, cancel: &CancelToken) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            return PlaybackOutcome::Cancelled;
        }

        let mut stream = match self.device.open_stream(StreamSpec::mono(buffer.sample_rate())) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%err, device = self.device.name(), "failed to open output stream");
                return PlaybackOutcome::Failed(err.to_string());
            }
        };
        tracing::debug!(device = self.device.name(), "output stream opened");

        let outcome = match self.write_chunks(stream.as_mut(), buffer, cancel) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%err, "output stream failed during playback");
                PlaybackOutcome::Failed(err.to_string())
            }
        };

        if let Err(err) = stream.stop() {
            tracing::warn!(%err, "failed to stop output stream");
        }
        drop(stream);
        tracing::debug!(?outcome, "output stream closed");
        outcome
    }

    fn write_chunks(
        &self,
        stream: &mut dyn OutputStream,
        buffer: &SampleBuffer,
        cancel: &CancelToken,
    ) -> Result<PlaybackOutcome> {
        for chunk in buffer.chunks(self.chunk_frames) {
            if cancel.is_cancelled() {
                return Ok(PlaybackOutcome::Cancelled);
            }
            stream.write(chunk)?;
        }
        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Cancelled);
        }
        stream.drain()?;
        Ok(PlaybackOutcome::Finished)
    }

    /// Runs the session on a new thread. `on_done` is called exactly once on
    /// that thread when streaming ends, including when the worker panics; it
    /// must only hand the outcome over to the UI thread.
    pub fn spawn<F>(self, session: PlaybackSession, on_done: F) -> Result<WorkerHandle>
    where
        F: FnOnce(SessionId, PlaybackOutcome) + Send + 'static,
    {
        let id = session.id;
        let (exited_tx, exited_rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name(format!("audio-worker-{}", id.0))
            .spawn(move || {
                let guard = CompletionGuard {
                    session: id,
                    outcome: None,
                    on_done: Some(on_done),
                    exited: exited_tx,
                };
                tracing::debug!(session = %id, samples = session.buffer.len(), "audio worker started");
                let outcome = self.run(&session.buffer, &session.cancel);
                guard.finish(outcome);
            })?;

        Ok(WorkerHandle {
            session: id,
            thread: Some(thread),
            exited: exited_rx,
        })
    }
}

/// Delivers the completion callback and the exit signal when dropped, so a
/// panicking worker still reports back.
struct CompletionGuard<F: FnOnce(SessionId, PlaybackOutcome)> {
    session: SessionId,
    outcome: Option<PlaybackOutcome>,
    on_done: Option<F>,
    exited: mpsc::SyncSender<()>,
}

impl<F: FnOnce(SessionId, PlaybackOutcome)> CompletionGuard<F> {
    fn finish(mut self, outcome: PlaybackOutcome) {
        self.outcome = Some(outcome);
    }
}

impl<F: FnOnce(SessionId, PlaybackOutcome)> Drop for CompletionGuard<F> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| PlaybackOutcome::Failed("audio worker panicked".to_string()));
        tracing::info!(session = %self.session, ?outcome, "audio worker exiting");
        if let Some(on_done) = self.on_done.take() {
            on_done(self.session, outcome);
        }
        let _ = self.exited.try_send(());
    }
}

/// Owner-side handle of a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    session: SessionId,
    thread: Option<JoinHandle<()>>,
    exited: mpsc::Receiver<()>,
}

impl WorkerHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| thread.is_finished())
            .unwrap_or(true)
    }

    /// Waits up to `timeout` for the worker to exit and joins it. Returns
    /// `false` if it is still running; the caller decides whether to proceed.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        if self.thread.is_none() {
            return true;
        }
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        tracing::warn!(session = %self.session, "audio worker panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::{audio::testing::FakeDevice, synthesize, WaveformFamily, WaveformRequest};

    fn buffer(duration: f64) -> SampleBuffer {
        synthesize(&WaveformRequest::new(WaveformFamily::Sine, 440.0, duration, 8_000).unwrap())
    }

    #[test]
    fn streams_every_chunk_then_drains() {
        let device = FakeDevice::new();
        let worker = AudioWorker::new(Arc::new(device.clone()), 100);

        let outcome = worker.run(&buffer(0.1), &CancelToken::new());

        assert_eq!(outcome, PlaybackOutcome::Finished);
        let log = device.log();
        let stream = &log.streams[0];
        assert_eq!(stream.spec, Some(StreamSpec::mono(8_000)));
        assert_eq!(stream.writes, 8);
        assert_eq!(stream.frames_written, 800);
        assert!(stream.drained && stream.stopped && stream.closed);
    }

    #[test]
    fn pre_cancelled_session_never_opens_a_stream() {
        let device = FakeDevice::new();
        let worker = AudioWorker::new(Arc::new(device.clone()), 100);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(worker.run(&buffer(0.1), &cancel), PlaybackOutcome::Cancelled);
        assert!(device.log().streams.is_empty());
    }

    #[test]
    fn open_failure_is_reported_not_raised() {
        let device = FakeDevice::new().failing_open();
        let worker = AudioWorker::new(Arc::new(device), 100);

        let outcome = worker.run(&buffer(0.1), &CancelToken::new());
        assert!(matches!(outcome, PlaybackOutcome::Failed(message) if message.contains("refused")));
    }

    #[test]
    fn write_failure_still_releases_stream() {
        let device = FakeDevice::new().failing_write(2);
        let worker = AudioWorker::new(Arc::new(device.clone()), 100);

        let outcome = worker.run(&buffer(0.1), &CancelToken::new());

        assert!(matches!(outcome, PlaybackOutcome::Failed(_)));
        let log = device.log();
        assert_eq!(log.streams[0].writes, 2);
        assert!(!log.streams[0].drained);
        assert!(log.streams[0].stopped && log.streams[0].closed);
        assert_eq!(log.open_now, 0);
    }

    #[test]
    fn cancellation_stops_between_chunks() {
        let device = FakeDevice::new().with_write_delay(Duration::from_millis(5));
        let worker = AudioWorker::new(Arc::new(device.clone()), 100);
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();

        let session = PlaybackSession {
            id: SessionId(7),
            buffer: buffer(10.0),
            cancel: cancel.clone(),
        };
        let mut handle = worker
            .spawn(session, move |id, outcome| tx.send((id, outcome)).unwrap())
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        assert!(handle.join_timeout(Duration::from_secs(2)));
        assert!(handle.is_finished());
        let (id, outcome) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(id, SessionId(7));
        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(rx.try_recv().is_err());

        let log = device.log();
        assert!(log.streams[0].writes < 800);
        assert!(!log.streams[0].drained);
        assert!(log.streams[0].closed);
    }

    #[test]
    fn join_times_out_while_worker_is_busy() {
        let device = FakeDevice::new().with_write_delay(Duration::from_millis(20));
        let worker = AudioWorker::new(Arc::new(device), 100);
        let cancel = CancelToken::new();
        let session = PlaybackSession {
            id: SessionId(1),
            buffer: buffer(1.0),
            cancel: cancel.clone(),
        };
        let mut handle = worker.spawn(session, |_, _| {}).unwrap();

        assert!(!handle.join_timeout(Duration::from_millis(1)));
        cancel.cancel();
        assert!(handle.join_timeout(Duration::from_secs(2)));
        assert!(handle.join_timeout(Duration::ZERO));
    }
}

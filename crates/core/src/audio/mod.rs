use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    thread,
    time::Duration,
};

use crate::{config::AudioConfig, Result, WaveLabError};

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{list_output_devices, CpalDevice, OutputDeviceInfo};

/// Format of a stream requested from an [`OutputDevice`]. Samples are
/// always interleaved `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamSpec {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// An audio output that can hand out streams. Streams are opened, written
/// and dropped on the thread that owns them; only the device itself is
/// shared between threads.
pub trait OutputDevice: Send + Sync {
    fn name(&self) -> &str;

    fn open_stream(&self, spec: StreamSpec) -> Result<Box<dyn OutputStream>>;
}

/// An open output stream. Dropping the stream closes it.
pub trait OutputStream {
    /// Blocks until the whole chunk has been accepted by the device.
    fn write(&mut self, chunk: &[f32]) -> Result<()>;

    /// Waits until already written audio has been played out.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stops output immediately; queued samples may be discarded.
    fn stop(&mut self) -> Result<()>;
}

/// Which audio output implementation to acquire at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    /// The host audio API through cpal.
    Cpal,
    /// Discards samples while pacing writes in real time.
    Silent,
    /// No audio output; playback stays disabled.
    None,
}

impl Default for AudioBackend {
    fn default() -> Self {
        if cfg!(feature = "cpal-backend") {
            Self::Cpal
        } else {
            Self::Silent
        }
    }
}

impl fmt::Display for AudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpal => f.write_str("cpal"),
            Self::Silent => f.write_str("silent"),
            Self::None => f.write_str("none"),
        }
    }
}

impl FromStr for AudioBackend {
    type Err = WaveLabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpal" => Ok(Self::Cpal),
            "silent" => Ok(Self::Silent),
            "none" => Ok(Self::None),
            other => Err(WaveLabError::invalid_param(
                "audio backend",
                format!("`{other}` is not one of cpal, silent, none"),
            )),
        }
    }
}

/// Process-wide audio handle. Acquired once at startup and released once at
/// shutdown; workers borrow the device through shared references.
pub struct AudioSubsystem {
    device: Arc<dyn OutputDevice>,
}

impl AudioSubsystem {
    pub fn acquire(backend: AudioBackend, config: &AudioConfig) -> Result<Self> {
        let device: Arc<dyn OutputDevice> = match backend {
            AudioBackend::Cpal => open_cpal(config)?,
            AudioBackend::Silent => Arc::new(SilentDevice::realtime()),
            AudioBackend::None => {
                return Err(WaveLabError::AudioUnavailable(
                    "audio output is disabled".to_string(),
                ))
            }
        };
        tracing::info!(%backend, device = device.name(), "acquired audio subsystem");
        Ok(Self { device })
    }

    /// Wraps an already constructed device.
    pub fn from_device(device: Arc<dyn OutputDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Arc<dyn OutputDevice> {
        Arc::clone(&self.device)
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Releases the handle. Workers that outlived their join bound still hold
    /// a reference, so the device itself is only torn down once they exit.
    pub fn release(self) {
        let holders = Arc::strong_count(&self.device) - 1;
        if holders > 0 {
            tracing::warn!(
                holders,
                "audio subsystem released while workers still hold the device"
            );
        } else {
            tracing::info!(device = self.device.name(), "released audio subsystem");
        }
    }
}

impl fmt::Debug for AudioSubsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSubsystem")
            .field("device", &self.device.name())
            .finish()
    }
}

#[cfg(feature = "cpal-backend")]
fn open_cpal(config: &AudioConfig) -> Result<Arc<dyn OutputDevice>> {
    Ok(Arc::new(CpalDevice::open(config.device.as_deref())?))
}

#[cfg(not(feature = "cpal-backend"))]
fn open_cpal(_config: &AudioConfig) -> Result<Arc<dyn OutputDevice>> {
    Err(WaveLabError::AudioUnavailable(
        "built without the `cpal-backend` feature".to_string(),
    ))
}

/// Output device that discards samples. Writes optionally sleep for the
/// duration of the chunk so playback takes as long as it would on hardware.
#[derive(Debug, Clone)]
pub struct SilentDevice {
    realtime: bool,
}

impl SilentDevice {
    pub fn realtime() -> Self {
        Self { realtime: true }
    }

    #[cfg(test)]
    pub(crate) fn instant() -> Self {
        Self { realtime: false }
    }
}

impl OutputDevice for SilentDevice {
    fn name(&self) -> &str {
        "silent"
    }

    fn open_stream(&self, spec: StreamSpec) -> Result<Box<dyn OutputStream>> {
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(WaveLabError::device(format!(
                "unsupported stream format {spec:?}"
            )));
        }
        Ok(Box::new(SilentStream {
            spec,
            realtime: self.realtime,
            frames_written: 0,
        }))
    }
}

struct SilentStream {
    spec: StreamSpec,
    realtime: bool,
    frames_written: usize,
}

impl OutputStream for SilentStream {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        let frames = chunk.len() / self.spec.channels as usize;
        self.frames_written += frames;
        if self.realtime {
            thread::sleep(Duration::from_secs_f64(
                frames as f64 / self.spec.sample_rate as f64,
            ));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        tracing::trace!(frames = self.frames_written, "silent stream stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("CPAL".parse::<AudioBackend>().unwrap(), AudioBackend::Cpal);
        assert_eq!("silent".parse::<AudioBackend>().unwrap(), AudioBackend::Silent);
        assert!("pulse".parse::<AudioBackend>().is_err());
    }

    #[test]
    fn none_backend_is_unavailable() {
        let err = AudioSubsystem::acquire(AudioBackend::None, &AudioConfig::default()).unwrap_err();
        assert!(matches!(err, WaveLabError::AudioUnavailable(_)));
    }

    #[cfg(not(feature = "cpal-backend"))]
    #[test]
    fn cpal_requires_feature() {
        let err = AudioSubsystem::acquire(AudioBackend::Cpal, &AudioConfig::default()).unwrap_err();
        assert!(format!("{err}").contains("cpal-backend"));
    }

    #[test]
    fn silent_stream_accepts_chunks() {
        let subsystem = AudioSubsystem::from_device(Arc::new(SilentDevice::instant()));
        let mut stream = subsystem.device().open_stream(StreamSpec::mono(44_100)).unwrap();

        stream.write(&[0.25; 1024]).unwrap();
        stream.drain().unwrap();
        stream.stop().unwrap();
        assert_eq!(subsystem.device_name(), "silent");
    }
}

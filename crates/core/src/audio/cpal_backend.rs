//! Output through the host audio API.
//!
//! cpal pulls samples from a callback thread while the playback worker pushes
//! them, so each stream couples the two with a lock-free ring buffer. A write
//! blocks until the ring has room for the whole chunk, which gives the worker
//! the same pacing as a blocking device write.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use super::{OutputDevice, OutputStream, StreamSpec};
use crate::{Result, WaveLabError};

/// How long a write may make no progress before the device counts as stalled.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(2);
/// Ring capacity expressed as playback time.
const RING_SECONDS: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Lists the output devices of the default host.
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| WaveLabError::device(format!("failed to enumerate devices: {e}")))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| OutputDeviceInfo {
            is_default: Some(&name) == default_name.as_ref(),
            name,
        })
        .collect())
}

fn resolve_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => {
            let devices = host
                .output_devices()
                .map_err(|e| WaveLabError::device(format!("failed to enumerate devices: {e}")))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(WaveLabError::AudioUnavailable(format!(
                "output device `{wanted}` not found"
            )))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| WaveLabError::AudioUnavailable("no default output device".to_string())),
    }
}

/// Handle to a cpal output device.
///
/// Only the device name is kept; each stream re-resolves the device on the
/// thread that will own the stream.
#[derive(Debug)]
pub struct CpalDevice {
    name: String,
    requested: Option<String>,
}

impl CpalDevice {
    pub fn open(requested: Option<&str>) -> Result<Self> {
        let device = resolve_device(requested)?;
        let name = device.name().unwrap_or_else(|_| "(no name)".to_string());
        let default_config = device
            .default_output_config()
            .map_err(|e| WaveLabError::AudioUnavailable(format!("{name}: {e}")))?;
        tracing::info!(
            host = cpal::default_host().id().name(),
            device = %name,
            channels = default_config.channels(),
            sample_rate = default_config.sample_rate().0,
            "opened cpal output device"
        );
        Ok(Self {
            name,
            requested: requested.map(str::to_string),
        })
    }
}

impl OutputDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_stream(&self, spec: StreamSpec) -> Result<Box<dyn OutputStream>> {
        let device = resolve_device(self.requested.as_deref())?;
        let default_config = device
            .default_output_config()
            .map_err(|e| WaveLabError::device(format!("failed to query output config: {e}")))?;
        if default_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(WaveLabError::device(format!(
                "unsupported sample format {:?}",
                default_config.sample_format()
            )));
        }

        // Mono input is duplicated across however many channels the device has.
        let channels = default_config.channels().max(spec.channels);
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let frames = ((spec.sample_rate as f64 * RING_SECONDS) as usize).max(1024);
        let ring = HeapRb::<f32>::new(frames * channels as usize);
        let (producer, mut consumer) = ring.split();

        let fault = Arc::new(Mutex::new(None));
        let callback_fault = Arc::clone(&fault);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let filled = consumer.pop_slice(data);
                    data[filled..].fill(0.0);
                },
                move |err| {
                    tracing::warn!(%err, "output stream error");
                    if let Ok(mut slot) = callback_fault.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| WaveLabError::device(format!("failed to build output stream: {e}")))?;
        stream
            .play()
            .map_err(|e| WaveLabError::device(format!("failed to start output stream: {e}")))?;

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels,
            ring_frames = frames,
            "cpal stream opened"
        );

        Ok(Box::new(CpalStream {
            stream,
            producer,
            fault,
            channels: channels as usize,
            sample_rate: spec.sample_rate,
            interleaved: Vec::new(),
        }))
    }
}

struct CpalStream {
    stream: cpal::Stream,
    producer: ringbuf::HeapProd<f32>,
    fault: Arc<Mutex<Option<String>>>,
    channels: usize,
    sample_rate: u32,
    interleaved: Vec<f32>,
}

impl CpalStream {
    fn check_fault(&self) -> Result<()> {
        let slot = self
            .fault
            .lock()
            .map_err(|_| WaveLabError::device("stream error slot has been poisoned"))?;
        match slot.as_ref() {
            Some(message) => Err(WaveLabError::device(message.clone())),
            None => Ok(()),
        }
    }
}

impl OutputStream for CpalStream {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        self.interleaved.clear();
        for sample in chunk {
            self.interleaved
                .extend(std::iter::repeat(*sample).take(self.channels));
        }

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < self.interleaved.len() {
            self.check_fault()?;
            // Whole frames only, so a partial pop can never shift channels.
            let room = self.producer.vacant_len() / self.channels * self.channels;
            let end = (offset + room).min(self.interleaved.len());
            let pushed = self.producer.push_slice(&self.interleaved[offset..end]);
            if pushed == 0 {
                if last_progress.elapsed() > STALL_TIMEOUT {
                    return Err(WaveLabError::device("output stream stalled"));
                }
                thread::sleep(POLL_INTERVAL);
            } else {
                offset += pushed;
                last_progress = Instant::now();
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let queued = self.producer.occupied_len() / self.channels;
        let deadline = Instant::now()
            + Duration::from_secs_f64(queued as f64 / self.sample_rate as f64)
            + STALL_TIMEOUT;
        while !self.producer.is_empty() {
            self.check_fault()?;
            if Instant::now() > deadline {
                return Err(WaveLabError::device("output stream did not drain"));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| WaveLabError::device(format!("failed to stop output stream: {e}")))
    }
}

//! Scriptable output device for exercising workers without hardware.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use super::{OutputDevice, OutputStream, StreamSpec};
use crate::{Result, WaveLabError};

#[derive(Debug, Default, Clone)]
pub struct StreamRecord {
    pub spec: Option<StreamSpec>,
    pub first_chunk: Vec<f32>,
    pub frames_written: usize,
    pub writes: usize,
    pub drained: bool,
    pub stopped: bool,
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct DeviceLog {
    pub streams: Vec<StreamRecord>,
    pub open_now: usize,
    pub max_open: usize,
}

#[derive(Clone)]
pub struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
    write_delay: Duration,
    fail_open: bool,
    fail_on_write: Option<usize>,
    panic_on_write: Option<usize>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(DeviceLog::default())),
            write_delay: Duration::ZERO,
            fail_open: false,
            fail_on_write: None,
            panic_on_write: None,
        }
    }

    /// Every write sleeps this long, standing in for device back-pressure.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// The n-th write (zero based) of every stream fails.
    pub fn failing_write(mut self, index: usize) -> Self {
        self.fail_on_write = Some(index);
        self
    }

    /// The n-th write (zero based) of every stream panics.
    pub fn panicking_write(mut self, index: usize) -> Self {
        self.panic_on_write = Some(index);
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap()
    }
}

impl OutputDevice for FakeDevice {
    fn name(&self) -> &str {
        "fake"
    }

    fn open_stream(&self, spec: StreamSpec) -> Result<Box<dyn OutputStream>> {
        if self.fail_open {
            return Err(WaveLabError::device("fake device refused to open"));
        }
        let index = {
            let mut log = self.log.lock().unwrap();
            log.streams.push(StreamRecord {
                spec: Some(spec),
                ..Default::default()
            });
            log.open_now += 1;
            log.max_open = log.max_open.max(log.open_now);
            log.streams.len() - 1
        };
        Ok(Box::new(FakeStream {
            index,
            log: Arc::clone(&self.log),
            write_delay: self.write_delay,
            fail_on_write: self.fail_on_write,
            panic_on_write: self.panic_on_write,
        }))
    }
}

struct FakeStream {
    index: usize,
    log: Arc<Mutex<DeviceLog>>,
    write_delay: Duration,
    fail_on_write: Option<usize>,
    panic_on_write: Option<usize>,
}

impl FakeStream {
    fn record<F: FnOnce(&mut StreamRecord)>(&self, f: F) {
        let mut log = self.log.lock().unwrap();
        f(&mut log.streams[self.index]);
    }
}

impl OutputStream for FakeStream {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        let writes = self.log.lock().unwrap().streams[self.index].writes;
        if self.fail_on_write == Some(writes) {
            return Err(WaveLabError::device("fake write failure"));
        }
        if self.panic_on_write == Some(writes) {
            panic!("fake write panic");
        }
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        self.record(|record| {
            if record.writes == 0 {
                record.first_chunk = chunk.to_vec();
            }
            record.writes += 1;
            record.frames_written += chunk.len();
        });
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.record(|record| record.drained = true);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(|record| record.stopped = true);
        Ok(())
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.streams[self.index].closed = true;
        log.open_now -= 1;
    }
}

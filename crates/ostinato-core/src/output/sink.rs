//! PCM sinks: where the driver writes finished buffers.

use crate::compat::{Arc, Mutex};
use crate::config::HardwareParams;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::time::Instant;

/// Failure of a single write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("buffer underrun")]
    Underrun,
    #[error("device suspended")]
    Suspended,
    #[error("write failed: {0}")]
    Other(String),
}

/// ALSA-style PCM device.
///
/// `open` negotiates and returns the parameters actually granted. Writes are
/// interleaved and blocking: a write returns once the device has accepted the
/// buffer.
pub trait PcmSink: Send {
    fn name(&self) -> &str;

    fn open(&mut self, params: &HardwareParams) -> Result<HardwareParams>;

    /// Returns the number of frames written.
    fn write(&mut self, samples: &[i16]) -> core::result::Result<usize, WriteError>;

    /// Recovers from an underrun.
    fn prepare(&mut self) -> Result<()>;

    /// Resumes a suspended device.
    fn resume(&mut self) -> Result<()>;

    fn drain(&mut self);

    fn close(&mut self);
}

/// Discards everything. With `realtime`, writes block for one buffer
/// duration so the driver runs at device speed.
#[derive(Debug, Default)]
pub struct NullSink {
    realtime: bool,
    params: Option<HardwareParams>,
    deadline: Option<Instant>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::default()
        }
    }
}

impl PcmSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&mut self, params: &HardwareParams) -> Result<HardwareParams> {
        self.params = Some(params.clone());
        self.deadline = None;
        Ok(params.clone())
    }

    fn write(&mut self, samples: &[i16]) -> core::result::Result<usize, WriteError> {
        let Some(params) = &self.params else {
            return Err(WriteError::Other("device not open".into()));
        };
        let frames = samples.len() / params.channels.max(1) as usize;

        if self.realtime {
            let now = Instant::now();
            let deadline = self.deadline.unwrap_or(now) + params.buffer_duration();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.deadline = Some(deadline);
        }
        Ok(frames)
    }

    fn prepare(&mut self) -> Result<()> {
        self.deadline = None;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) {}

    fn close(&mut self) {
        self.params = None;
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    params: Option<HardwareParams>,
    locked: bool,
    writes: Vec<Vec<i16>>,
    faults: VecDeque<WriteError>,
    fail_resume: bool,
    prepares: usize,
    resumes: usize,
    drained: bool,
    closed: bool,
}

/// Records every buffer written. Clones share the same recording, so a test
/// can keep one handle and give the other to the driver.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail as if the device were held by another
    /// process.
    pub fn lock_device(&self) {
        self.state.lock().locked = true;
    }

    pub fn unlock_device(&self) {
        self.state.lock().locked = false;
    }

    /// The next write fails with `fault` instead of being recorded.
    pub fn inject(&self, fault: WriteError) {
        self.state.lock().faults.push_back(fault);
    }

    pub fn inject_underrun(&self) {
        self.inject(WriteError::Underrun);
    }

    pub fn inject_suspend(&self) {
        self.inject(WriteError::Suspended);
    }

    pub fn fail_resume(&self, fail: bool) {
        self.state.lock().fail_resume = fail;
    }

    pub fn writes(&self) -> Vec<Vec<i16>> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn prepare_count(&self) -> usize {
        self.state.lock().prepares
    }

    pub fn resume_count(&self) -> usize {
        self.state.lock().resumes
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().params.is_some()
    }

    pub fn was_drained(&self) -> bool {
        self.state.lock().drained
    }

    pub fn was_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl PcmSink for CaptureSink {
    fn name(&self) -> &str {
        "capture"
    }

    fn open(&mut self, params: &HardwareParams) -> Result<HardwareParams> {
        let mut state = self.state.lock();
        if state.locked {
            return Err(Error::LockedSoundcard(params.device.clone()));
        }
        state.params = Some(params.clone());
        state.closed = false;
        state.drained = false;
        Ok(params.clone())
    }

    fn write(&mut self, samples: &[i16]) -> core::result::Result<usize, WriteError> {
        let mut state = self.state.lock();
        let Some(params) = &state.params else {
            return Err(WriteError::Other("device not open".into()));
        };
        let frames = samples.len() / params.channels.max(1) as usize;

        if let Some(fault) = state.faults.pop_front() {
            return Err(fault);
        }
        state.writes.push(samples.to_vec());
        Ok(frames)
    }

    fn prepare(&mut self) -> Result<()> {
        self.state.lock().prepares += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.resumes += 1;
        if state.fail_resume {
            return Err(Error::BrokenConfiguration("resume failed".into()));
        }
        Ok(())
    }

    fn drain(&mut self) {
        self.state.lock().drained = true;
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.params = None;
        state.closed = true;
    }
}

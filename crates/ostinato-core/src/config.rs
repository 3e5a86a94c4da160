//! Output driver configuration.

use crate::{Error, Result};
use core::time::Duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEVICE: &str = "hw:0";
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_BUFFER_SIZE: usize = 944;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BPM: f64 = 120.0;

/// Length of one tic as a fraction of a 4/4 bar.
pub const DEFAULT_TACT: f64 = 0.25;

/// The tic counter wraps after this many tics.
pub const DEFAULT_PERIOD: u64 = 64;

/// Number of hardware-sized buffers in the output ring.
pub const RING_SIZE: usize = 4;

const MAX_CHANNELS: u16 = 32;
const MAX_BUFFER_SIZE: usize = 16384;

/// PCM sample layout written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SampleFormat {
    /// Signed 16 bit, little endian, interleaved.
    #[default]
    S16Le,
}

impl SampleFormat {
    pub fn bits(&self) -> u16 {
        match self {
            SampleFormat::S16Le => 16,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }
}

/// Parameters negotiated with the sound device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareParams {
    /// Backend specific device name, e.g. `hw:0` or `default`.
    pub device: String,
    pub channels: u16,
    pub format: SampleFormat,
    /// Frames per hardware buffer.
    pub buffer_size: usize,
    pub sample_rate: u32,
}

impl Default for HardwareParams {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            channels: DEFAULT_CHANNELS,
            format: SampleFormat::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl HardwareParams {
    /// Interleaved samples in one hardware buffer.
    pub fn samples_per_buffer(&self) -> usize {
        self.buffer_size * self.channels as usize
    }

    pub fn bytes_per_buffer(&self) -> usize {
        self.samples_per_buffer() * self.format.bytes()
    }

    /// Wall-clock time the device needs to play one buffer.
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::ChannelsNotAvailable(self.channels));
        }
        if self.sample_rate < 8000 || self.sample_rate > 384000 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(Error::BufferSizeNotAvailable(self.buffer_size));
        }
        if self.device.is_empty() {
            return Err(Error::InvalidConfig("empty device name".into()));
        }
        Ok(())
    }
}

/// Configuration for the output driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub hardware: HardwareParams,
    pub bpm: f64,
    /// Tic length as a fraction of a 4/4 bar.
    pub tact: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            hardware: HardwareParams::default(),
            bpm: DEFAULT_BPM,
            tact: DEFAULT_TACT,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        self.hardware.validate()?;
        validate_bpm(self.bpm)?;
        if !(self.tact > 0.0 && self.tact <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "tact {} out of range (0-1 bars)",
                self.tact
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_bpm(bpm: f64) -> Result<()> {
    if !(1.0..=999.0).contains(&bpm) {
        return Err(Error::InvalidTempo(bpm));
    }
    Ok(())
}

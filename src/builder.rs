//! Builder for configuring and constructing an `OstinatoEngine`.

use crate::{OstinatoEngine, Result};
use ostinato_core::{DriverConfig, NullSink, OutputDriver, PcmSink};

/// Without a sink the engine writes to a [`NullSink`], which discards audio
/// without pacing. Pick a real device with [`hardware`](Self::hardware)
/// (feature `cpal`) or pass any [`PcmSink`] through [`sink`](Self::sink).
///
/// # Example
///
/// ```ignore
/// use ostinato::prelude::*;
///
/// let engine = OstinatoEngine::builder()
///     .sample_rate(48000)
///     .buffer_size(512)
///     .bpm(96.0)
///     .hardware()
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: DriverConfig,
    sink: Option<Box<dyn PcmSink>>,
}

impl EngineBuilder {
    /// Replaces every setting made so far.
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.hardware.sample_rate = rate;
        self
    }

    /// Frames per hardware buffer. Default: 944
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.config.hardware.buffer_size = frames;
        self
    }

    /// Default: 2
    pub fn channels(mut self, count: u16) -> Self {
        self.config.hardware.channels = count;
        self
    }

    /// Default: 120
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.config.bpm = bpm;
        self
    }

    /// Default: `hw:0`
    pub fn device(mut self, name: impl Into<String>) -> Self {
        self.config.hardware.device = name.into();
        self
    }

    pub fn sink(mut self, sink: impl PcmSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Plays through the sound card.
    #[cfg(feature = "cpal")]
    pub fn hardware(self) -> Self {
        self.sink(ostinato_core::CpalSink::new())
    }

    pub fn build(self) -> Result<OstinatoEngine> {
        let sink = self.sink.unwrap_or_else(|| Box::new(NullSink::new()));
        let driver = OutputDriver::new(self.config, sink)?;
        Ok(OstinatoEngine::from_driver(driver))
    }
}

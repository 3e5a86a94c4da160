//! Tempo clock: turns a stream of buffers into tics.

use super::callback::TicInfo;
use crate::config::{validate_bpm, DEFAULT_PERIOD};
use crate::Result;

/// Counts buffers and emits a tic every `delay` buffers.
///
/// `delay` is fractional; the remainder carries over so tics stay on the
/// tempo grid instead of drifting to buffer boundaries. `attack` is the frame
/// inside the buffer where the tic lands.
#[derive(Debug, Clone)]
pub struct TempoClock {
    bpm: f64,
    tact: f64,
    sample_rate: u32,
    buffer_size: usize,
    delay: f64,
    /// Buffers until the next tic, may be fractional.
    until_tic: f64,
    tic_counter: u64,
    period: u64,
}

impl TempoClock {
    pub fn new(bpm: f64, tact: f64, sample_rate: u32, buffer_size: usize) -> Self {
        let mut clock = Self {
            bpm,
            tact,
            sample_rate,
            buffer_size,
            delay: 0.0,
            until_tic: 0.0,
            tic_counter: 0,
            period: DEFAULT_PERIOD,
        };
        clock.delay = clock.compute_delay();
        clock
    }

    fn compute_delay(&self) -> f64 {
        (60.0 / self.bpm)
            * (self.sample_rate as f64 / self.buffer_size as f64)
            * (self.tact * 4.0)
    }

    /// Buffers per tic.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        validate_bpm(bpm)?;
        self.bpm = bpm;
        self.delay = self.compute_delay();
        self.until_tic = self.until_tic.clamp(0.0, self.delay);
        Ok(())
    }

    /// Rebuilds the delay after the device negotiated different parameters.
    pub fn set_format(&mut self, sample_rate: u32, buffer_size: usize) {
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;
        self.delay = self.compute_delay();
    }

    pub fn tic_counter(&self) -> u64 {
        self.tic_counter
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Restarts at tic zero. The next buffer carries a tic at frame zero.
    pub fn reset(&mut self) {
        self.until_tic = 0.0;
        self.tic_counter = 0;
    }

    /// Accounts for one buffer. At most one tic is reported per buffer.
    ///
    /// A delay under one buffer tics every buffer; the tics that don't fit
    /// are dropped rather than owed.
    pub fn advance(&mut self) -> Option<TicInfo> {
        let tic = if self.until_tic < 1.0 {
            let attack = (self.until_tic.max(0.0) * self.buffer_size as f64) as usize;
            let info = TicInfo {
                tic: self.tic_counter,
                attack: attack.min(self.buffer_size.saturating_sub(1)),
            };
            self.tic_counter = (self.tic_counter + 1) % self.period;
            self.until_tic += self.delay;
            Some(info)
        } else {
            None
        };

        self.until_tic = (self.until_tic - 1.0).max(0.0);
        tic
    }
}

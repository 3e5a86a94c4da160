//! Per-cycle render callback.

use crate::config::HardwareParams;

/// A tic landing inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TicInfo {
    /// Tic counter, wraps at the clock period.
    pub tic: u64,
    /// Frame offset of the tic inside the buffer.
    pub attack: usize,
}

/// Describes the buffer being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleInfo {
    pub cycle: u64,
    pub tic: Option<TicInfo>,
    pub buffer_size: usize,
    pub channels: u16,
    pub sample_rate: u32,
}

impl CycleInfo {
    pub fn for_params(params: &HardwareParams, cycle: u64, tic: Option<TicInfo>) -> Self {
        Self {
            cycle,
            tic,
            buffer_size: params.buffer_size,
            channels: params.channels,
            sample_rate: params.sample_rate,
        }
    }
}

impl Default for CycleInfo {
    fn default() -> Self {
        Self::for_params(&HardwareParams::default(), 0, None)
    }
}

/// Fills one interleaved output buffer per cycle.
///
/// The buffer arrives zeroed. Runs on the thread that drives the output
/// driver, without the driver's state lock held.
pub trait RenderCallback: Send {
    fn render(&mut self, buffer: &mut [i16], cycle: &CycleInfo);
}

impl<F> RenderCallback for F
where
    F: FnMut(&mut [i16], &CycleInfo) + Send,
{
    fn render(&mut self, buffer: &mut [i16], cycle: &CycleInfo) {
        self(buffer, cycle)
    }
}

/// Converts a float sample to 16 bit, clamping to full scale.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

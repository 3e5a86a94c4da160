//! Frame-level contracts for codec collaborators.

use crate::compat::{Arc, Mutex};

/// Produces mono frames, e.g. a decoder.
pub trait FrameSource: Send {
    /// Fills `out` and returns the number of frames written. Fewer than
    /// `out.len()` means the source is exhausted.
    fn read_frames(&mut self, out: &mut [f32]) -> usize;
}

/// Consumes mono frames, e.g. an encoder.
pub trait FrameSink: Send {
    /// Returns the number of frames accepted.
    fn write_frames(&mut self, frames: &[f32]) -> usize;
}

/// In-memory source over a fixed signal.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Arc<[f32]>,
    position: usize,
}

impl BufferSource {
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
            position: 0,
        }
    }
}

impl FrameSource for BufferSource {
    fn read_frames(&mut self, out: &mut [f32]) -> usize {
        let remaining = &self.samples[self.position..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        n
    }
}

/// In-memory sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    frames: Arc<Mutex<Vec<f32>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<f32> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSink for BufferSink {
    fn write_frames(&mut self, frames: &[f32]) -> usize {
        self.frames.lock().extend_from_slice(frames);
        frames.len()
    }
}

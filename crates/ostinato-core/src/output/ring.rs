//! The four-buffer output ring.
//!
//! While buffer `c` is current (being written to the device), buffer `c+1`
//! is being filled, and buffer `c+3` is zeroed so it is clean by the time it
//! comes up for filling.

use crate::config::RING_SIZE;

/// Selects the current ring buffer. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferFlag {
    #[default]
    Buffer0,
    Buffer1,
    Buffer2,
    Buffer3,
}

impl BufferFlag {
    pub fn index(&self) -> usize {
        match self {
            BufferFlag::Buffer0 => 0,
            BufferFlag::Buffer1 => 1,
            BufferFlag::Buffer2 => 2,
            BufferFlag::Buffer3 => 3,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % RING_SIZE {
            0 => BufferFlag::Buffer0,
            1 => BufferFlag::Buffer1,
            2 => BufferFlag::Buffer2,
            _ => BufferFlag::Buffer3,
        }
    }

    pub fn next(&self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

#[derive(Debug)]
pub struct BufferRing {
    buffers: [Vec<i16>; RING_SIZE],
    current: BufferFlag,
}

impl BufferRing {
    /// Ring of zeroed buffers of `samples` interleaved samples each.
    pub fn new(samples: usize) -> Self {
        Self {
            buffers: core::array::from_fn(|_| vec![0; samples]),
            current: BufferFlag::default(),
        }
    }

    pub fn current(&self) -> BufferFlag {
        self.current
    }

    pub fn samples(&self) -> usize {
        self.buffers[0].len()
    }

    /// Index of the buffer being filled.
    pub fn fill_index(&self) -> usize {
        (self.current.index() + 1) % RING_SIZE
    }

    /// Index of the buffer zeroed on the next tick.
    pub fn zero_index(&self) -> usize {
        (self.current.index() + 3) % RING_SIZE
    }

    pub fn buffer(&self, index: usize) -> &[i16] {
        &self.buffers[index % RING_SIZE]
    }

    pub fn current_buffer(&self) -> &[i16] {
        &self.buffers[self.current.index()]
    }

    pub fn zero_next(&mut self) {
        let index = self.zero_index();
        self.buffers[index].fill(0);
    }

    /// Takes the fill buffer out of the ring so it can be rendered without
    /// holding the ring.
    pub fn take_fill(&mut self) -> Vec<i16> {
        let index = self.fill_index();
        core::mem::take(&mut self.buffers[index])
    }

    /// Puts a buffer taken with [`take_fill`](Self::take_fill) back.
    pub fn restore_fill(&mut self, buffer: Vec<i16>) {
        let index = self.fill_index();
        self.buffers[index] = buffer;
    }

    pub fn rotate(&mut self) {
        self.current = self.current.next();
    }
}

//! Built-in recall kinds. These only move frames and count tics.

use super::io::{FrameSink, FrameSource};
use super::node::{Recall, StageContext};
use super::RecallId;
use crate::compat::{Arc, Mutex};
use crate::recall_any;
use crate::recycling::RecyclingRef;

fn slot(cx: &StageContext<'_>, slot: usize) -> Option<RecyclingRef> {
    let recycling = cx
        .recycling_context
        .as_ref()
        .and_then(|ctx| ctx.get(slot));
    if recycling.is_none() {
        tracing::trace!(node = cx.node.id(), slot, "no recycling bound");
    }
    recycling
}

pub type SourceFactory = Arc<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

/// Streams a [`FrameSource`] into one recycling slot, one buffer per cycle.
/// Marks itself done at the end of the stream.
pub struct StreamRecycling {
    slot: usize,
    open: SourceFactory,
    reader: Option<Box<dyn FrameSource>>,
}

impl StreamRecycling {
    pub fn new(
        slot: usize,
        open: impl Fn() -> Box<dyn FrameSource> + Send + Sync + 'static,
    ) -> Self {
        Self {
            slot,
            open: Arc::new(open),
            reader: None,
        }
    }
}

impl Clone for StreamRecycling {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            open: Arc::clone(&self.open),
            reader: None,
        }
    }
}

impl Recall for StreamRecycling {
    recall_any!("stream-recycling");

    fn duplicated(&mut self, _recall_id: &RecallId) {
        self.reader = Some((self.open)());
    }

    fn run_init_pre(&mut self, _cx: &mut StageContext<'_>) {
        if self.reader.is_none() {
            self.reader = Some((self.open)());
        }
    }

    fn run_inter(&mut self, cx: &mut StageContext<'_>) {
        let (Some(recycling), Some(reader)) = (slot(cx, self.slot), self.reader.as_mut()) else {
            return;
        };

        let mut signal = recycling.signal();
        let n = reader.read_frames(&mut signal);
        if n < signal.len() {
            signal[n..].fill(0.0);
            drop(signal);
            tracing::debug!(node = cx.node.id(), "end of stream");
            cx.node.done();
        }
    }
}

/// Writes one recycling slot to a [`FrameSink`] every cycle.
#[derive(Clone)]
pub struct RecordRecycling {
    slot: usize,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
}

impl RecordRecycling {
    pub fn new(slot: usize, sink: impl FrameSink + 'static) -> Self {
        Self {
            slot,
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }
}

impl Recall for RecordRecycling {
    recall_any!("record-recycling");

    fn run_post(&mut self, cx: &mut StageContext<'_>) {
        let Some(recycling) = slot(cx, self.slot) else {
            return;
        };
        let signal = recycling.signal();
        let written = self.sink.lock().write_frames(&signal);
        if written < signal.len() {
            tracing::warn!(node = cx.node.id(), written, frames = signal.len(), "short write");
        }
    }
}

/// Counts tics. After `length` tics it either starts over or marks itself
/// done.
#[derive(Debug, Clone)]
pub struct CountBeats {
    length: u64,
    looping: bool,
    count: u64,
}

impl CountBeats {
    pub fn new(length: u64, looping: bool) -> Self {
        Self {
            length,
            looping,
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Recall for CountBeats {
    recall_any!("count-beats");

    fn duplicated(&mut self, _recall_id: &RecallId) {
        self.count = 0;
    }

    fn run_pre(&mut self, cx: &mut StageContext<'_>) {
        if cx.cycle.tic.is_none() {
            return;
        }

        self.count += 1;
        if self.count >= self.length {
            if self.looping {
                self.count = 0;
            } else {
                cx.node.done();
            }
        }
    }
}

/// Groups child recalls. Does nothing itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecallGroup;

impl Recall for RecallGroup {
    recall_any!("recall-group");
}

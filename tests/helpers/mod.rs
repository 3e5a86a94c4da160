//! Test helpers and fixtures for ostinato integration tests
//!
//! Engines here write into a [`CaptureSink`] and are stepped by hand with
//! `start_manual` + `process_cycles`. The first write of a run is always the
//! silent buffer primed at start; the buffer rendered in cycle `n` is written
//! as write `n + 1`.

#![allow(dead_code)]

use ostinato::prelude::*;
use ostinato::RecallRef;
use std::sync::Arc;

/// Lowest rate the driver accepts, keeps tempo arithmetic small.
pub const TEST_SAMPLE_RATE: u32 = 8000;

pub const TEST_BUFFER_SIZE: usize = 4;

pub const TEST_CHANNELS: u16 = 2;

/// Routes engine logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine over a capture sink with the test format.
pub fn test_engine() -> (OstinatoEngine, CaptureSink) {
    test_engine_with(TEST_BUFFER_SIZE, TEST_CHANNELS)
}

pub fn test_engine_with(buffer_size: usize, channels: u16) -> (OstinatoEngine, CaptureSink) {
    init_tracing();
    let sink = CaptureSink::new();
    let engine = OstinatoEngine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .buffer_size(buffer_size)
        .channels(channels)
        .sink(sink.clone())
        .build()
        .expect("Failed to create test engine");
    (engine, sink)
}

/// Samples of `channel` in an interleaved buffer.
pub fn channel(buffer: &[i16], channel: usize, channels: usize) -> Vec<i16> {
    buffer.iter().skip(channel).step_by(channels).copied().collect()
}

pub fn pcm(sample: f32) -> i16 {
    ostinato::core::f32_to_i16(sample)
}

/// Writes a constant into one recycling slot every cycle. Never finishes.
#[derive(Debug, Clone)]
pub struct Constant {
    pub slot: usize,
    pub value: f32,
}

impl Recall for Constant {
    recall_any!("constant");

    fn run_inter(&mut self, cx: &mut StageContext<'_>) {
        let Some(recycling) = cx
            .recycling_context
            .as_ref()
            .and_then(|ctx| ctx.get(self.slot))
        else {
            return;
        };
        recycling.signal().fill(self.value);
    }
}

/// Container with one template per recall, named `name`.
pub fn container_of(name: &str, recalls: Vec<RecallRef>) -> Arc<RecallContainer> {
    let container = RecallContainer::new(name);
    for template in recalls {
        container
            .attach_template(template)
            .expect("Failed to attach template");
    }
    container
}

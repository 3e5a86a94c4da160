//! Integration test modules for ostinato
//!
//! - engine: builder, start/stop, registry, tempo
//! - playback: recall instances writing into recyclings and the mix
//! - gates: gate queue behavior seen from the engine

pub mod engine;
pub mod gates;
pub mod playback;

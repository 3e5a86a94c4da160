//! Runtime kernel for a recall-based sequencer.
//!
//! # Primary API
//!
//! - [`RecyclingContext`]: tree of signal-buffer slots shared between processing nodes
//! - [`RecallNode`] / [`RecallContainer`]: processing nodes, their templates and lifecycle
//! - [`scheduler`]: stage propagation over a recall tree
//! - [`OutputDriver`]: hardware-synchronized cycle loop with its [`GateQueue`]
//!
//! # Feature-gated APIs
//!
//! - `"cpal"`: [`CpalSink`] for hardware output
//!
//! # Example
//!
//! ```ignore
//! use ostinato_core::*;
//!
//! let driver = OutputDriver::with_sink(DriverConfig::default(), NullSink::new())?;
//! driver.set_callback(|out: &mut [i16], _cycle: &CycleInfo| out.fill(0));
//! driver.prime()?;
//! driver.step()?;
//! ```

#[macro_use]
mod macros;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod config;
pub use config::{
    DriverConfig, HardwareParams, SampleFormat, DEFAULT_BPM, DEFAULT_BUFFER_SIZE,
    DEFAULT_CHANNELS, DEFAULT_DEVICE, DEFAULT_PERIOD, DEFAULT_SAMPLE_RATE, DEFAULT_TACT, RING_SIZE,
};

/// Locking and shared-ownership primitives.
pub mod compat;

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag};

pub mod recycling;
pub use recycling::{
    context_over_chain, find_scope, ContextRef, Recycling, RecyclingContext, RecyclingRef,
    SoundScope,
};

pub mod recall;
pub use recall::{
    scheduler, DomainTags, GroupId, Lifecycle, Provider, Recall, RecallContainer,
    RecallDependency, RecallId, RecallNode, RecallRef, ResolveContext, Stage, StageContext,
};

pub mod output;
pub use output::{
    f32_to_i16, BufferFlag, CaptureSink, CycleInfo, Gate, GateQueue, NullSink, OutputDriver,
    PcmSink, PlaybackState, RenderCallback, TempoClock, TicInfo, WriteError,
};

#[cfg(feature = "cpal")]
pub use output::CpalSink;

//! # Ostinato - Recall-based Sequencer Runtime
//!
//! ## Architecture
//!
//! Ostinato is an umbrella crate over **ostinato-core**, which provides:
//! - **Recycling contexts** - trees of signal-buffer slots shared between nodes
//! - **Recall trees** - processing nodes with a staged init/run lifecycle
//! - **Output driver** - hardware-synchronized cycle loop with a gate queue
//!
//! The [`OstinatoEngine`] ties them together: it instantiates containers for
//! a context, ticks the instances once per cycle and mixes their recyclings
//! into the device buffer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let engine = OstinatoEngine::builder().bpm(120.0).build()?;
//!
//! let container = RecallContainer::new("loop");
//! container.attach_template(RecallNode::template(CountBeats::new(4, true)))?;
//! engine.register_container(container)?;
//!
//! let context = context_over_chain(2, engine.buffer_size());
//! let playback = engine.play_named("loop", &context, SoundScope::Sequencer)?;
//!
//! engine.start_manual()?;
//! engine.process_cycles(8)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` - Hardware output through CPAL

/// Re-export of ostinato-core for direct access
pub use ostinato_core as core;

pub use ostinato_core::{
    context_over_chain,
    find_scope,
    scheduler,

    // Lock-free primitives
    AtomicDouble,
    AtomicFlag,

    // Output
    CaptureSink,
    ContextRef,
    CycleInfo,
    DomainTags,
    DriverConfig,
    Gate,
    GateQueue,
    GroupId,
    HardwareParams,
    NullSink,
    OutputDriver,
    PcmSink,
    PlaybackState,

    // Recall tree
    Recall,
    RecallContainer,
    RecallId,
    RecallNode,
    RecallRef,

    // Recycling
    Recycling,
    RecyclingContext,
    RecyclingRef,
    RenderCallback,
    SampleFormat,
    SoundScope,
    Stage,
    StageContext,
    TicInfo,
    WriteError,
};

pub use ostinato_core::recall::{
    io::{BufferSink, BufferSource, FrameSink, FrameSource},
    CountBeats, RecallGroup, RecordRecycling, StreamRecycling,
};

#[cfg(feature = "cpal")]
pub use ostinato_core::CpalSink;

mod builder;
mod engine;
mod error;

pub use builder::EngineBuilder;
pub use engine::{OstinatoEngine, Playback, PlaybackStatus};
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{EngineBuilder, OstinatoEngine, Playback, PlaybackStatus};

    // Recycling
    pub use crate::{context_over_chain, ContextRef, RecyclingContext, SoundScope};

    // Recall tree
    pub use crate::{
        CountBeats, Recall, RecallContainer, RecallGroup, RecallNode, RecordRecycling,
        StageContext, StreamRecycling,
    };

    // Output
    pub use crate::{CaptureSink, NullSink, PcmSink};

    pub use ostinato_core::recall_any;
}

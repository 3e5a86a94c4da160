//! Error types for ostinato-core.
//!
//! Structural misuse (bad positions, running a template, stopping a stopped
//! driver) never shows up here; it is absorbed and logged where it happens.
//! Only conditions that stop audio from being produced or delivered are
//! surfaced as an [`Error`].

use crate::config::SampleFormat;
use thiserror::Error;

/// Error type for ostinato-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to open pcm device: {0}")]
    LockedSoundcard(String),

    #[error("Broken configuration for playback: {0}")]
    BrokenConfiguration(String),

    #[error("Sample format not available for playback: {0:?}")]
    SampleFormatNotAvailable(SampleFormat),

    #[error("Channels count ({0}) not available for playback")]
    ChannelsNotAvailable(u16),

    #[error("Rate doesn't match (requested {requested}Hz, got {actual}Hz)")]
    SampleRateNotAvailable { requested: u32, actual: u32 },

    #[error("Unable to set buffer size {0} for playback")]
    BufferSizeNotAvailable(usize),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be between 1.0 and 999.0 BPM")]
    InvalidTempo(f64),

    #[error("Empty gate: no successor gate queued behind the head")]
    EmptyGate,

    #[error("Output driver is shut down")]
    Shutdown,

    #[error("Failed to spawn {name} thread")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Recall {0} is not a template")]
    NotATemplate(String),

    #[cfg(feature = "cpal")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),
}

/// Coarse classification of an [`Error`].
///
/// Start-up code matches on [`ErrorKind::LockedSoundcard`] to decide between
/// aborting and falling back to another sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LockedSoundcard,
    Configuration,
    EmptyGate,
    Shutdown,
    Structural,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LockedSoundcard(_) => ErrorKind::LockedSoundcard,
            #[cfg(feature = "cpal")]
            Error::DeviceNotAvailable(_)
            | Error::BuildStream(_)
            | Error::PlayStream(_)
            | Error::DevicesError(_)
            | Error::DeviceNameError(_) => ErrorKind::LockedSoundcard,
            Error::BrokenConfiguration(_)
            | Error::SampleFormatNotAvailable(_)
            | Error::ChannelsNotAvailable(_)
            | Error::SampleRateNotAvailable { .. }
            | Error::BufferSizeNotAvailable(_)
            | Error::InvalidConfig(_)
            | Error::InvalidTempo(_) => ErrorKind::Configuration,
            Error::EmptyGate => ErrorKind::EmptyGate,
            Error::Shutdown | Error::ThreadSpawn { .. } => ErrorKind::Shutdown,
            Error::NotATemplate(_) => ErrorKind::Structural,
        }
    }

    pub fn is_locked_soundcard(&self) -> bool {
        self.kind() == ErrorKind::LockedSoundcard
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

//! Centralized error type for the ostinato umbrella crate.
//!
//! Wraps core errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] ostinato_core::Error),

    #[error("No container registered as {0:?}")]
    UnknownContainer(String),

    #[error("Container {0:?} is already registered")]
    DuplicateContainer(String),
}

impl Error {
    /// True if the sound device could not be opened.
    pub fn is_locked_soundcard(&self) -> bool {
        matches!(self, Error::Core(e) if e.is_locked_soundcard())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

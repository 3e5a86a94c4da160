//! Recall state flags.
//!
//! Lifecycle booleans live together under one lock on the node, domain tags
//! under another. Capability flags (template, propagate-done) are fixed at
//! construction or atomic, and live on the node itself.

use crate::recycling::SoundScope;

/// Lifecycle state of one recall node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    pub connected: bool,
    pub resolved: bool,
    pub run_initialized: bool,
    pub done: bool,
    pub hide: bool,
    pub remove: bool,
    pub removed: bool,
    /// Position of this node in the global order of `done` transitions,
    /// zero while not done.
    pub done_serial: u64,
}

/// Which editing domains a recall takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainTags {
    pub playback: bool,
    pub sequencer: bool,
    pub notation: bool,
}

impl DomainTags {
    pub const NONE: DomainTags = DomainTags {
        playback: false,
        sequencer: false,
        notation: false,
    };

    pub const ALL: DomainTags = DomainTags {
        playback: true,
        sequencer: true,
        notation: true,
    };

    /// Tags implied by a sound scope. Wave and MIDI passes are playback.
    pub fn for_scope(scope: SoundScope) -> Self {
        match scope {
            SoundScope::Playback | SoundScope::Wave | SoundScope::Midi => DomainTags {
                playback: true,
                ..Self::NONE
            },
            SoundScope::Sequencer => DomainTags {
                sequencer: true,
                ..Self::NONE
            },
            SoundScope::Notation => DomainTags {
                notation: true,
                ..Self::NONE
            },
        }
    }

    pub fn is_subset_of(&self, other: &DomainTags) -> bool {
        (!self.playback || other.playback)
            && (!self.sequencer || other.sequencer)
            && (!self.notation || other.notation)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

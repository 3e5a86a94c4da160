//! Sound scopes tag a recycling context with the kind of pass it serves.

use super::ContextRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundScope {
    Playback,
    Sequencer,
    Notation,
    Wave,
    Midi,
}

impl SoundScope {
    pub const ALL: [SoundScope; 5] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
        SoundScope::Midi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SoundScope::Playback => "playback",
            SoundScope::Sequencer => "sequencer",
            SoundScope::Notation => "notation",
            SoundScope::Wave => "wave",
            SoundScope::Midi => "midi",
        }
    }
}

impl core::fmt::Display for SoundScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// First context in `list` whose scope is `scope`.
pub fn find_scope(list: &[ContextRef], scope: SoundScope) -> Option<ContextRef> {
    list.iter()
        .find(|ctx| ctx.sound_scope() == Some(scope))
        .cloned()
}

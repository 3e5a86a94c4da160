//! Execution-scope identifiers.

use crate::compat::{AtomicU64, Ordering};
use crate::recycling::SoundScope;
use serde::{Deserialize, Serialize};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RECALL_ID: AtomicU64 = AtomicU64::new(1);

/// Shared by every recall id of one execution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(u64);

impl GroupId {
    /// A group id that has never been handed out before.
    pub fn new() -> Self {
        Self(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds recall instances to one execution scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecallId {
    id: u64,
    group_id: GroupId,
    sound_scope: Option<SoundScope>,
}

impl RecallId {
    pub fn new(group_id: GroupId, sound_scope: Option<SoundScope>) -> Self {
        Self {
            id: NEXT_RECALL_ID.fetch_add(1, Ordering::Relaxed),
            group_id,
            sound_scope,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn sound_scope(&self) -> Option<SoundScope> {
        self.sound_scope
    }
}

//! Nested recycling contexts.
//!
//! A [`RecyclingContext`] is a scope over an array of [`Recycling`] handles.
//! Contexts form a tree: children hold no strong reference to their parent,
//! parents hold their children strongly.
//!
//! Each context guards its state with its own reentrant lock. Operations take
//! that lock for the duration of the call only and never hold the locks of two
//! contexts at once, so tree walks lock one node at a time.

use super::chain::{self, RecyclingRef};
use super::SoundScope;
use crate::compat::{Arc, AtomicU64, Ordering, ReentrantMutex, Weak};
use crate::recall::RecallId;
use core::cell::RefCell;

pub type ContextRef = Arc<RecyclingContext>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct ContextState {
    recycling: Vec<Option<RecyclingRef>>,
    sound_scope: Option<SoundScope>,
    recall_id: Option<RecallId>,
    parent: Weak<RecyclingContext>,
    children: Vec<ContextRef>,
    retired: bool,
}

pub struct RecyclingContext {
    id: u64,
    state: ReentrantMutex<RefCell<ContextState>>,
}

impl RecyclingContext {
    /// Context with `length` empty slots.
    pub fn new(length: usize) -> ContextRef {
        Self::from_slots(vec![None; length])
    }

    /// Context populated with `list`, in order.
    pub fn with_recyclings(list: Vec<RecyclingRef>) -> ContextRef {
        Self::from_slots(list.into_iter().map(Some).collect())
    }

    fn from_slots(recycling: Vec<Option<RecyclingRef>>) -> ContextRef {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: ReentrantMutex::new(RefCell::new(ContextState {
                recycling,
                ..Default::default()
            })),
        })
    }

    #[inline]
    fn with_state<R>(&self, f: impl FnOnce(&mut ContextState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.with_state(|s| s.recycling.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, position: usize) -> Option<RecyclingRef> {
        self.with_state(|s| s.recycling.get(position).cloned().flatten())
    }

    /// The occupied slots, in order.
    pub fn recyclings(&self) -> Vec<RecyclingRef> {
        self.with_state(|s| s.recycling.iter().flatten().cloned().collect())
    }

    pub fn sound_scope(&self) -> Option<SoundScope> {
        self.with_state(|s| s.sound_scope)
    }

    pub fn set_sound_scope(&self, scope: Option<SoundScope>) {
        self.with_state(|s| s.sound_scope = scope);
    }

    pub fn recall_id(&self) -> Option<RecallId> {
        self.with_state(|s| s.recall_id)
    }

    pub fn set_recall_id(&self, recall_id: Option<RecallId>) {
        self.with_state(|s| s.recall_id = recall_id);
    }

    pub fn parent(&self) -> Option<ContextRef> {
        self.with_state(|s| s.parent.upgrade())
    }

    pub fn children(&self) -> Vec<ContextRef> {
        self.with_state(|s| s.children.clone())
    }

    pub fn is_retired(&self) -> bool {
        self.with_state(|s| s.retired)
    }

    /// Puts `recycling` into slot `position`, releasing the previous occupant.
    pub fn replace(&self, recycling: &RecyclingRef, position: usize) {
        self.with_state(|s| match s.recycling.get_mut(position) {
            Some(slot) => *slot = Some(Arc::clone(recycling)),
            None => tracing::debug!(
                context = self.id,
                position,
                length = s.recycling.len(),
                "replace out of range"
            ),
        });
    }

    pub fn add(&self, recycling: &RecyclingRef) {
        self.with_state(|s| s.recycling.push(Some(Arc::clone(recycling))));
    }

    /// Removes every slot holding `recycling`. Returns the number removed.
    pub fn remove(&self, recycling: &RecyclingRef) -> usize {
        self.with_state(|s| {
            let before = s.recycling.len();
            s.recycling
                .retain(|slot| !slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, recycling)));
            before - s.recycling.len()
        })
    }

    pub fn insert(&self, recycling: &RecyclingRef, position: usize) {
        self.with_state(|s| {
            if position > s.recycling.len() {
                tracing::debug!(
                    context = self.id,
                    position,
                    length = s.recycling.len(),
                    "insert out of range"
                );
                return;
            }
            s.recycling.insert(position, Some(Arc::clone(recycling)));
        });
    }

    pub fn find(&self, recycling: &RecyclingRef) -> Option<usize> {
        self.with_state(|s| find_in(&s.recycling, recycling))
    }

    /// Index of `recycling` inside the first direct child that holds it.
    pub fn find_child(&self, recycling: &RecyclingRef) -> Option<usize> {
        self.children()
            .iter()
            .find_map(|child| child.find(recycling))
    }

    /// Index of `recycling` in the parent's array.
    pub fn find_parent(&self, recycling: &RecyclingRef) -> Option<usize> {
        self.parent()?.find(recycling)
    }

    pub fn get_toplevel(self: &Arc<Self>) -> ContextRef {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn add_child(self: &Arc<Self>, child: &ContextRef) {
        if Arc::ptr_eq(self, child) {
            tracing::debug!(context = self.id, "context can't be its own child");
            return;
        }

        let previous = child.with_state(|s| s.parent.upgrade());
        match previous {
            Some(parent) if Arc::ptr_eq(&parent, self) => {
                // Parent link already set; make sure the edge exists once.
                self.with_state(|s| {
                    if !s.children.iter().any(|c| Arc::ptr_eq(c, child)) {
                        s.children.push(Arc::clone(child));
                    }
                });
                return;
            }
            Some(parent) => parent.remove_child(child),
            None => {}
        }

        child.with_state(|s| s.parent = Arc::downgrade(self));
        self.with_state(|s| {
            if !s.children.iter().any(|c| Arc::ptr_eq(c, child)) {
                s.children.push(Arc::clone(child));
            }
        });
    }

    pub fn remove_child(self: &Arc<Self>, child: &ContextRef) {
        child.with_state(|s| {
            if s.parent.upgrade().is_some_and(|p| Arc::ptr_eq(&p, self)) {
                s.parent = Weak::new();
            }
        });
        self.with_state(|s| s.children.retain(|c| !Arc::ptr_eq(c, child)));
    }

    /// Recall ids of the direct children that carry one, in child order.
    pub fn get_child_recall_id(&self) -> Vec<RecallId> {
        self.children()
            .iter()
            .filter_map(|child| child.recall_id())
            .collect()
    }

    /// Replaces this context by one spanning `[new_first, new_last]`.
    ///
    /// The new context takes this context's place under its parent, inherits
    /// its scope and recall id, and adopts its children. This context is
    /// retired. Returns `None` if `new_last` can't be reached from
    /// `new_first`.
    pub fn reset_recycling(
        self: &Arc<Self>,
        old_first: Option<&RecyclingRef>,
        old_last: Option<&RecyclingRef>,
        new_first: &RecyclingRef,
        new_last: &RecyclingRef,
    ) -> Option<ContextRef> {
        let Some(list) = chain::span(new_first, new_last) else {
            tracing::debug!(
                context = self.id,
                first = new_first.id(),
                last = new_last.id(),
                "malformed recycling chain"
            );
            return None;
        };

        if let (Some(first), Some(last)) = (old_first, old_last) {
            tracing::debug!(
                context = self.id,
                old_span = ?chain::span_len(first, last),
                new_span = list.len(),
                "resetting recycling"
            );
        }

        let replacement = RecyclingContext::with_recyclings(list);
        let (scope, recall_id, parent, children) = self.with_state(|s| {
            (
                s.sound_scope,
                s.recall_id,
                s.parent.upgrade(),
                core::mem::take(&mut s.children),
            )
        });
        replacement.with_state(|s| {
            s.sound_scope = scope;
            s.recall_id = recall_id;
        });

        if let Some(parent) = parent {
            replacement.with_state(|s| s.parent = Arc::downgrade(&parent));
            parent.with_state(|s| {
                match s.children.iter().position(|c| Arc::ptr_eq(c, self)) {
                    Some(index) => s.children[index] = Arc::clone(&replacement),
                    None => s.children.push(Arc::clone(&replacement)),
                }
            });
            self.with_state(|s| s.parent = Weak::new());
        }

        for child in &children {
            child.with_state(|s| s.parent = Arc::downgrade(&replacement));
        }
        replacement.with_state(|s| s.children = children);

        self.retire();
        Some(replacement)
    }

    /// Releases the array and detaches this context from its parent and
    /// children.
    pub fn retire(self: &Arc<Self>) {
        let (parent, children) = self.with_state(|s| {
            s.recycling.clear();
            s.retired = true;
            (s.parent.upgrade(), core::mem::take(&mut s.children))
        });

        if let Some(parent) = parent {
            parent.remove_child(self);
        }
        for child in &children {
            child.with_state(|s| {
                if s.parent.upgrade().is_some_and(|p| Arc::ptr_eq(&p, self)) {
                    s.parent = Weak::new();
                }
            });
        }
    }
}

impl core::fmt::Debug for RecyclingContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.with_state(|s| {
            f.debug_struct("RecyclingContext")
                .field("id", &self.id)
                .field("length", &s.recycling.len())
                .field("sound_scope", &s.sound_scope)
                .field("children", &s.children.len())
                .finish()
        })
    }
}

fn find_in(slots: &[Option<RecyclingRef>], recycling: &RecyclingRef) -> Option<usize> {
    slots
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, recycling)))
}

/// Builds a context over a freshly linked chain of `length` recyclings.
pub fn context_over_chain(length: usize, buffer_size: usize) -> ContextRef {
    RecyclingContext::with_recyclings(chain::chain(length, buffer_size))
}

//! Buffer chains.
//!
//! A [`Recycling`] is one link of a chain of mono signal buffers. Successor
//! links are strong, predecessor links are weak, so dropping the head of a
//! chain releases the whole chain.

use crate::compat::{Arc, AtomicU64, Mutex, MutexGuard, Ordering, RwLock, Weak};

pub type RecyclingRef = Arc<Recycling>;

static NEXT_RECYCLING_ID: AtomicU64 = AtomicU64::new(1);

pub struct Recycling {
    id: u64,
    next: RwLock<Option<RecyclingRef>>,
    prev: RwLock<Weak<Recycling>>,
    signal: Mutex<Vec<f32>>,
}

impl Recycling {
    /// Unlinked recycling with a zeroed buffer of `buffer_size` frames.
    pub fn new(buffer_size: usize) -> RecyclingRef {
        Arc::new(Self {
            id: NEXT_RECYCLING_ID.fetch_add(1, Ordering::Relaxed),
            next: RwLock::new(None),
            prev: RwLock::new(Weak::new()),
            signal: Mutex::new(vec![0.0; buffer_size]),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn next(&self) -> Option<RecyclingRef> {
        self.next.read().clone()
    }

    pub fn prev(&self) -> Option<RecyclingRef> {
        self.prev.read().upgrade()
    }

    /// Locks the signal buffer.
    pub fn signal(&self) -> MutexGuard<'_, Vec<f32>> {
        self.signal.lock()
    }

    pub fn buffer_size(&self) -> usize {
        self.signal.lock().len()
    }

    pub fn clear(&self) {
        self.signal.lock().fill(0.0);
    }

    /// Detaches this recycling from both neighbours.
    pub fn unlink(&self) {
        *self.next.write() = None;
        *self.prev.write() = Weak::new();
    }
}

impl core::fmt::Debug for Recycling {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recycling")
            .field("id", &self.id)
            .field("next", &self.next.read().as_ref().map(|r| r.id))
            .finish()
    }
}

/// Makes `next` the successor of `prev`.
pub fn link(prev: &RecyclingRef, next: &RecyclingRef) {
    *prev.next.write() = Some(Arc::clone(next));
    *next.prev.write() = Arc::downgrade(prev);
}

/// Builds a linked chain of `len` recyclings.
pub fn chain(len: usize, buffer_size: usize) -> Vec<RecyclingRef> {
    let list: Vec<_> = (0..len).map(|_| Recycling::new(buffer_size)).collect();
    for pair in list.windows(2) {
        link(&pair[0], &pair[1]);
    }
    list
}

/// Position of `target` walking successor links from `start` up to, but not
/// including, `end`. `end == None` walks to the end of the chain.
pub fn position(
    start: &RecyclingRef,
    end: Option<&RecyclingRef>,
    target: &RecyclingRef,
) -> Option<usize> {
    let mut current = Some(Arc::clone(start));
    let mut index = 0;

    while let Some(recycling) = current {
        if end.is_some_and(|end| Arc::ptr_eq(end, &recycling)) {
            break;
        }
        if Arc::ptr_eq(&recycling, target) {
            return Some(index);
        }
        index += 1;
        current = recycling.next();
    }

    None
}

/// Number of recyclings in `[first, last]`, or `None` if `last` is not
/// reachable from `first`.
pub fn span_len(first: &RecyclingRef, last: &RecyclingRef) -> Option<usize> {
    position(first, None, last).map(|pos| pos + 1)
}

/// The recyclings of `[first, last]` in chain order.
pub fn span(first: &RecyclingRef, last: &RecyclingRef) -> Option<Vec<RecyclingRef>> {
    let len = span_len(first, last)?;
    let mut list = Vec::with_capacity(len);
    let mut current = Some(Arc::clone(first));

    while let Some(recycling) = current {
        let done = Arc::ptr_eq(&recycling, last);
        current = recycling.next();
        list.push(recycling);
        if done {
            break;
        }
    }

    Some(list)
}

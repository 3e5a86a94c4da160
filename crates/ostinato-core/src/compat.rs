//! Shared ownership and synchronization primitives used across the core.
//!
//! Everything that locks goes through `parking_lot`; shared ownership is plain
//! `Arc`/`Weak`.

pub use parking_lot::{Condvar, Mutex, MutexGuard, ReentrantMutex, RwLock};

pub use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Weak,
};

//! Recycling contexts and the buffer chains they scope.

mod chain;
mod context;
mod scope;

pub use chain::{chain, link, position, span, span_len, Recycling, RecyclingRef};
pub use context::{context_over_chain, ContextRef, RecyclingContext};
pub use scope::{find_scope, SoundScope};

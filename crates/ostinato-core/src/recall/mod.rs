//! The recall tree: processing nodes, their lifecycle, and the containers
//! that turn templates into running instances.

mod container;
mod dependency;
mod flags;
mod id;
pub mod io;
mod kinds;
mod lookup;
pub(crate) mod node;
pub mod scheduler;

pub use container::RecallContainer;
pub use dependency::RecallDependency;
pub use flags::{DomainTags, Lifecycle};
pub use id::{GroupId, RecallId};
pub use kinds::{CountBeats, RecallGroup, RecordRecycling, SourceFactory, StreamRecycling};
pub use lookup::{
    find_by_effect, find_group_id, find_provider, find_provider_with_group_id, find_type,
    find_type_with_group_id, template_find_provider, template_find_type,
};
pub use node::{
    Provider, Recall, RecallBuilder, RecallNode, RecallRef, ResolveContext, StageContext,
};
pub use scheduler::Stage;

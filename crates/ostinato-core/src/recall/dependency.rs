//! Links from an instance to the instance of another template it relies on.

use super::node::{RecallNode, RecallRef};
use super::GroupId;
use crate::compat::{Arc, Weak};

/// A dependency on whichever instance of `template` shares the dependent's
/// group id.
#[derive(Clone)]
pub struct RecallDependency {
    template: RecallRef,
    resolved: Weak<RecallNode>,
}

impl RecallDependency {
    pub fn new(template: &RecallRef) -> Self {
        Self {
            template: Arc::clone(template),
            resolved: Weak::new(),
        }
    }

    pub fn template(&self) -> &RecallRef {
        &self.template
    }

    /// First instance in `candidates` of the same kind and effect as the
    /// template, in `group_id`, and from the same provider if the template
    /// has one.
    pub fn resolve(&self, candidates: &[RecallRef], group_id: GroupId) -> Option<RecallRef> {
        candidates
            .iter()
            .find(|candidate| {
                !candidate.is_template()
                    && candidate.kind() == self.template.kind()
                    && candidate.effect() == self.template.effect()
                    && candidate
                        .recall_id()
                        .is_some_and(|id| id.group_id() == group_id)
                    && match self.template.provider() {
                        Some(provider) => candidate
                            .provider()
                            .is_some_and(|other| other.ptr_eq(provider)),
                        None => true,
                    }
            })
            .cloned()
    }

    pub fn resolved(&self) -> Option<RecallRef> {
        self.resolved.upgrade()
    }

    pub(crate) fn bind(&mut self, node: &RecallRef) {
        self.resolved = Arc::downgrade(node);
    }

    pub(crate) fn unresolved(&self) -> Self {
        Self::new(&self.template)
    }
}

impl core::fmt::Debug for RecallDependency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallDependency")
            .field("template", &self.template.effect())
            .field("resolved", &self.resolved.upgrade().map(|n| n.id()))
            .finish()
    }
}

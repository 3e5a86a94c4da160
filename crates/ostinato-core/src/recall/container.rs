//! Recall containers hold the templates attached to one owner and the
//! instances made from them.

use super::lookup;
use super::node::RecallRef;
use super::scheduler;
use super::{GroupId, RecallId};
use crate::compat::{Arc, RwLock};
use crate::recycling::ContextRef;
use crate::{Error, Result};

pub struct RecallContainer {
    name: String,
    templates: RwLock<Vec<RecallRef>>,
    instances: RwLock<Vec<RecallRef>>,
}

impl RecallContainer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            templates: RwLock::new(Vec::new()),
            instances: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_template(self: &Arc<Self>, template: RecallRef) -> Result<()> {
        if !template.is_template() {
            return Err(Error::NotATemplate(template.effect().to_string()));
        }

        template.set_container(self);
        let mut templates = self.templates.write();
        if !templates.iter().any(|t| Arc::ptr_eq(t, &template)) {
            tracing::debug!(container = %self.name, effect = template.effect(), "template attached");
            templates.push(template);
        }
        Ok(())
    }

    /// Returns whether the template was attached.
    pub fn detach_template(&self, template: &RecallRef) -> bool {
        let mut templates = self.templates.write();
        let before = templates.len();
        templates.retain(|t| !Arc::ptr_eq(t, template));
        templates.len() != before
    }

    pub fn templates(&self) -> Vec<RecallRef> {
        self.templates.read().clone()
    }

    /// Root instances, in instantiation order.
    pub fn instances(&self) -> Vec<RecallRef> {
        self.instances.read().clone()
    }

    pub fn instances_of(&self, recall_id: &RecallId) -> Vec<RecallRef> {
        self.instances
            .read()
            .iter()
            .filter(|node| node.recall_id().as_ref() == Some(recall_id))
            .cloned()
            .collect()
    }

    /// Every instance node in `group_id`, descendants included.
    pub fn instances_in_group(&self, group_id: GroupId) -> Vec<RecallRef> {
        self.instances
            .read()
            .iter()
            .flat_map(scheduler::subtree)
            .filter(|node| node.recall_id().is_some_and(|id| id.group_id() == group_id))
            .collect()
    }

    /// Duplicates every template for `recall_id`, binds the copies to `ctx`
    /// and resolves their dependencies. Returns the new root instances.
    pub fn instantiate(
        self: &Arc<Self>,
        recall_id: &RecallId,
        ctx: Option<&ContextRef>,
    ) -> Vec<RecallRef> {
        let roots: Vec<_> = self
            .templates()
            .iter()
            .map(|template| {
                let root = template.duplicate_tree(recall_id);
                root.set_container(self);
                if let Some(ctx) = ctx {
                    root.set_recycling_context(Some(Arc::clone(ctx)));
                }
                root
            })
            .collect();

        self.instances.write().extend(roots.iter().cloned());

        let candidates = self.instances_in_group(recall_id.group_id());
        for root in &roots {
            scheduler::resolve(root, &candidates);
        }

        tracing::debug!(
            container = %self.name,
            recall_id = recall_id.id(),
            instances = roots.len(),
            "instantiated"
        );
        roots
    }

    /// Cancels and drops the root instances bound to `recall_id`.
    pub fn remove_instances(&self, recall_id: &RecallId) -> usize {
        let removed: Vec<_> = {
            let mut instances = self.instances.write();
            let (removed, kept): (Vec<_>, Vec<_>) = instances
                .drain(..)
                .partition(|node| node.recall_id().as_ref() == Some(recall_id));
            *instances = kept;
            removed
        };

        for node in &removed {
            node.cancel();
            node.remove();
        }
        removed.len()
    }

    /// Drops root instances that have been removed.
    pub fn prune(&self) -> usize {
        let mut instances = self.instances.write();
        let before = instances.len();
        instances.retain(|node| !node.is_removed());
        before - instances.len()
    }

    fn all(&self) -> Vec<RecallRef> {
        let mut list = self.templates();
        list.extend(self.instances());
        list
    }

    /// Searches templates then instances. Templates carry no recall id, so
    /// `recall_id == None` finds a template.
    pub fn find_by_effect(&self, recall_id: Option<&RecallId>, effect: &str) -> Option<RecallRef> {
        lookup::find_by_effect(&self.all(), recall_id, effect).cloned()
    }

    pub fn find_type<T: super::Recall>(&self) -> Option<RecallRef> {
        lookup::find_type::<T>(&self.all()).cloned()
    }

    pub fn template_find_type<T: super::Recall>(&self) -> Option<RecallRef> {
        lookup::template_find_type::<T>(&self.templates()).cloned()
    }

    pub fn find_group_id(&self, group_id: GroupId) -> Option<RecallRef> {
        lookup::find_group_id(&self.instances(), group_id).cloned()
    }
}

impl core::fmt::Debug for RecallContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallContainer")
            .field("name", &self.name)
            .field("templates", &self.templates.read().len())
            .field("instances", &self.instances.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recall::node::tests::recall_id;
    use crate::recall::{CountBeats, RecallGroup, RecallNode};
    use crate::recycling::RecyclingContext;

    #[test]
    fn test_attach_rejects_instances() {
        let container = RecallContainer::new("audio");
        let instance = RecallNode::instance(RecallGroup, recall_id());
        let err = container.attach_template(instance).unwrap_err();
        assert!(matches!(err, Error::NotATemplate(_)));
    }

    #[test]
    fn test_attach_detach() {
        let container = RecallContainer::new("audio");
        let template = RecallNode::template(RecallGroup);
        container.attach_template(template.clone()).unwrap();
        container.attach_template(template.clone()).unwrap();
        assert_eq!(container.templates().len(), 1);
        assert!(Arc::ptr_eq(&template.container().unwrap(), &container));

        assert!(container.detach_template(&template));
        assert!(!container.detach_template(&template));
    }

    #[test]
    fn test_instantiate_binds_context_and_dependencies() {
        let container = RecallContainer::new("audio");
        let counter = RecallNode::template(CountBeats::new(4, false));
        let group = RecallNode::builder(RecallGroup).depends_on(&counter).template();
        group.add_child(&RecallNode::template(RecallGroup));
        container.attach_template(counter.clone()).unwrap();
        container.attach_template(group).unwrap();

        let ctx = RecyclingContext::new(1);
        let id = recall_id();
        let roots = container.instantiate(&id, Some(&ctx));

        assert_eq!(roots.len(), 2);
        assert_eq!(container.instances_of(&id).len(), 2);
        assert_eq!(container.instances_in_group(id.group_id()).len(), 3);

        let group_instance = &roots[1];
        let child = &group_instance.children()[0];
        assert!(Arc::ptr_eq(&child.recycling_context().unwrap(), &ctx));
        assert!(Arc::ptr_eq(&child.container().unwrap(), &container));
        assert!(group_instance.lifecycle().resolved);

        let resolved = group_instance.resolved_dependency("count-beats").unwrap();
        assert!(Arc::ptr_eq(&resolved, &roots[0]));
    }

    #[test]
    fn test_remove_instances() {
        let container = RecallContainer::new("audio");
        container
            .attach_template(RecallNode::template(RecallGroup))
            .unwrap();
        let first = recall_id();
        let second = recall_id();
        let roots = container.instantiate(&first, None);
        container.instantiate(&second, None);

        assert_eq!(container.remove_instances(&first), 1);
        assert!(roots[0].is_done());
        assert!(roots[0].is_removed());
        assert_eq!(container.instances().len(), 1);
    }

    #[test]
    fn test_find_by_effect_prefers_templates_without_id() {
        let container = RecallContainer::new("audio");
        let template = RecallNode::template(CountBeats::new(2, false));
        container.attach_template(template.clone()).unwrap();
        let id = recall_id();
        let roots = container.instantiate(&id, None);

        let found = container.find_by_effect(None, "count-beats").unwrap();
        assert!(Arc::ptr_eq(&found, &template));
        let found = container.find_by_effect(Some(&id), "count-beats").unwrap();
        assert!(Arc::ptr_eq(&found, &roots[0]));
        assert!(Arc::ptr_eq(&container.template_find_type::<CountBeats>().unwrap(), &template));
    }
}

//! Recall nodes.
//!
//! A [`RecallNode`] wraps one boxed [`Recall`] behavior together with the
//! bookkeeping every recall carries: lifecycle flags, domain tags, its recall
//! id, the container that owns it, and its place in the recall tree.
//!
//! Parents hold their children strongly and children point back through a
//! [`Weak`]. Lifecycle hooks are run by the [`scheduler`](super::scheduler),
//! never directly.

use super::dependency::RecallDependency;
use super::flags::{DomainTags, Lifecycle};
use super::scheduler;
use super::{RecallContainer, RecallId};
use crate::compat::{Arc, AtomicU64, Mutex, Ordering, Weak};
use crate::lockfree::AtomicFlag;
use crate::output::CycleInfo;
use crate::recycling::ContextRef;
use core::any::{Any, TypeId};
use dyn_clone::DynClone;

pub type RecallRef = Arc<RecallNode>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DONE_SERIAL: AtomicU64 = AtomicU64::new(1);

/// What a stage hook can see of the node it runs on.
pub struct StageContext<'a> {
    pub node: &'a RecallRef,
    /// The node's recycling context, inherited from the nearest ancestor
    /// that has one.
    pub recycling_context: Option<ContextRef>,
    pub cycle: CycleInfo,
}

/// Passed to [`Recall::resolve_dependencies`].
pub struct ResolveContext<'a> {
    pub node: &'a RecallRef,
    /// Instances sharing the node's group id.
    pub candidates: &'a [RecallRef],
}

/// Behavior of one kind of recall.
///
/// All hooks default to no-ops. A hook runs with the node's behavior lock
/// held, so it must not call [`RecallNode::with_behavior`] on its own node.
/// It may mark its node done, add children to it, or touch other nodes.
pub trait Recall: DynClone + Send + 'static {
    /// Name used by [`find_by_effect`](super::find_by_effect).
    fn effect(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called on the copy made for `recall_id` when a node is duplicated.
    fn duplicated(&mut self, _recall_id: &RecallId) {}

    fn resolve_dependencies(&mut self, _cx: &mut ResolveContext<'_>) {}

    fn run_init_pre(&mut self, _cx: &mut StageContext<'_>) {}

    fn run_init_inter(&mut self, _cx: &mut StageContext<'_>) {}

    fn run_init_post(&mut self, _cx: &mut StageContext<'_>) {}

    fn run_pre(&mut self, _cx: &mut StageContext<'_>) {}

    fn run_inter(&mut self, _cx: &mut StageContext<'_>) {}

    fn run_post(&mut self, _cx: &mut StageContext<'_>) {}
}

dyn_clone::clone_trait_object!(Recall);

/// Opaque identity of whatever a recall was created for (an audio, a channel,
/// a recycling). Compared by pointer.
#[derive(Clone)]
pub struct Provider(Arc<dyn Any + Send + Sync>);

impl Provider {
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    pub fn ptr_eq(&self, other: &Provider) -> bool {
        core::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl core::fmt::Debug for Provider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Provider({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Default)]
struct Links {
    parent: Weak<RecallNode>,
    children: Vec<RecallRef>,
}

pub struct RecallNode {
    id: u64,
    effect: &'static str,
    kind: TypeId,
    template: bool,
    propagate_done: AtomicFlag,
    lifecycle: Mutex<Lifecycle>,
    /// Format the node was initialized with, handed to late joiners.
    init_cycle: Mutex<Option<CycleInfo>>,
    tags: Mutex<DomainTags>,
    recall_id: Mutex<Option<RecallId>>,
    container: Mutex<Weak<RecallContainer>>,
    provider: Option<Provider>,
    links: Mutex<Links>,
    dependencies: Mutex<Vec<RecallDependency>>,
    recycling_context: Mutex<Option<ContextRef>>,
    behavior: Mutex<Box<dyn Recall>>,
}

/// Builder for [`RecallNode`]s.
pub struct RecallBuilder {
    behavior: Box<dyn Recall>,
    provider: Option<Provider>,
    propagate_done: bool,
    tags: DomainTags,
    dependencies: Vec<RecallDependency>,
    recycling_context: Option<ContextRef>,
}

impl RecallBuilder {
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Become done once the last child has been removed.
    pub fn propagate_done(mut self, propagate: bool) -> Self {
        self.propagate_done = propagate;
        self
    }

    pub fn tags(mut self, tags: DomainTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn depends_on(mut self, template: &RecallRef) -> Self {
        self.dependencies.push(RecallDependency::new(template));
        self
    }

    pub fn recycling_context(mut self, ctx: ContextRef) -> Self {
        self.recycling_context = Some(ctx);
        self
    }

    pub fn template(self) -> RecallRef {
        self.build(true, None)
    }

    pub fn instance(self, recall_id: RecallId) -> RecallRef {
        self.build(false, Some(recall_id))
    }

    fn build(self, template: bool, recall_id: Option<RecallId>) -> RecallRef {
        let kind = <dyn Any as Any>::type_id(self.behavior.as_any());
        Arc::new(RecallNode {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            effect: self.behavior.effect(),
            kind,
            template,
            propagate_done: AtomicFlag::new(self.propagate_done),
            lifecycle: Mutex::new(Lifecycle::default()),
            init_cycle: Mutex::new(None),
            tags: Mutex::new(self.tags),
            recall_id: Mutex::new(recall_id),
            container: Mutex::new(Weak::new()),
            provider: self.provider,
            links: Mutex::new(Links::default()),
            dependencies: Mutex::new(self.dependencies),
            recycling_context: Mutex::new(self.recycling_context),
            behavior: Mutex::new(self.behavior),
        })
    }
}

impl RecallNode {
    pub fn builder(behavior: impl Recall) -> RecallBuilder {
        RecallBuilder {
            behavior: Box::new(behavior),
            provider: None,
            propagate_done: false,
            tags: DomainTags::NONE,
            dependencies: Vec::new(),
            recycling_context: None,
        }
    }

    pub fn template(behavior: impl Recall) -> RecallRef {
        Self::builder(behavior).template()
    }

    pub fn instance(behavior: impl Recall, recall_id: RecallId) -> RecallRef {
        Self::builder(behavior).instance(recall_id)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn effect(&self) -> &'static str {
        self.effect
    }

    /// `TypeId` of the concrete behavior.
    pub fn kind(&self) -> TypeId {
        self.kind
    }

    pub fn is_kind<T: Recall>(&self) -> bool {
        self.kind == TypeId::of::<T>()
    }

    pub fn is_template(&self) -> bool {
        self.template
    }

    pub fn propagate_done(&self) -> bool {
        self.propagate_done.get()
    }

    pub fn set_propagate_done(&self, propagate: bool) {
        self.propagate_done.set(propagate);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.lifecycle.lock().connected
    }

    pub fn is_run_initialized(&self) -> bool {
        self.lifecycle.lock().run_initialized
    }

    pub fn is_done(&self) -> bool {
        self.lifecycle.lock().done
    }

    pub fn is_removed(&self) -> bool {
        self.lifecycle.lock().removed
    }

    pub fn tags(&self) -> DomainTags {
        *self.tags.lock()
    }

    pub fn recall_id(&self) -> Option<RecallId> {
        *self.recall_id.lock()
    }

    pub fn container(&self) -> Option<Arc<RecallContainer>> {
        self.container.lock().upgrade()
    }

    /// Sets the owning container on this node and its subtree.
    pub(crate) fn set_container(&self, container: &Arc<RecallContainer>) {
        *self.container.lock() = Arc::downgrade(container);
        for child in self.children() {
            child.set_container(container);
        }
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    pub fn parent(&self) -> Option<RecallRef> {
        self.links.lock().parent.upgrade()
    }

    pub fn children(&self) -> Vec<RecallRef> {
        self.links.lock().children.clone()
    }

    pub fn dependencies(&self) -> Vec<RecallDependency> {
        self.dependencies.lock().clone()
    }

    pub fn add_dependency(&self, template: &RecallRef) {
        self.dependencies
            .lock()
            .push(RecallDependency::new(template));
    }

    /// The resolved instance of the first dependency on a template with
    /// `effect`.
    pub fn resolved_dependency(&self, effect: &str) -> Option<RecallRef> {
        self.dependencies
            .lock()
            .iter()
            .filter(|dep| dep.template().effect() == effect)
            .find_map(RecallDependency::resolved)
    }

    pub(crate) fn bind_dependencies(&self, candidates: &[RecallRef]) {
        let Some(group_id) = self.recall_id().map(|id| id.group_id()) else {
            return;
        };
        for dep in self.dependencies.lock().iter_mut() {
            match dep.resolve(candidates, group_id) {
                Some(found) => dep.bind(&found),
                None => tracing::debug!(
                    node = self.id,
                    dependency = dep.template().effect(),
                    "dependency not resolved"
                ),
            }
        }
    }

    /// The recycling context bound to this node or its nearest ancestor.
    pub fn recycling_context(&self) -> Option<ContextRef> {
        if let Some(ctx) = self.recycling_context.lock().clone() {
            return Some(ctx);
        }
        let mut current = self.parent();
        while let Some(node) = current {
            if let Some(ctx) = node.recycling_context.lock().clone() {
                return Some(ctx);
            }
            current = node.parent();
        }
        None
    }

    pub fn set_recycling_context(&self, ctx: Option<ContextRef>) {
        *self.recycling_context.lock() = ctx;
    }

    /// Runs `f` on the behavior, holding its lock.
    pub fn with_behavior<R>(&self, f: impl FnOnce(&mut dyn Recall) -> R) -> R {
        let mut behavior = self.behavior.lock();
        f(&mut **behavior)
    }

    /// Runs `f` on the behavior if it is a `T`.
    pub fn with_kind<T: Recall, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut behavior = self.behavior.lock();
        behavior.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub(crate) fn invoke(self: &Arc<Self>, stage: scheduler::Stage, cycle: &CycleInfo) {
        use scheduler::Stage;

        let mut cx = StageContext {
            node: self,
            recycling_context: self.recycling_context(),
            cycle: *cycle,
        };
        let mut behavior = self.behavior.lock();
        match stage {
            Stage::InitPre => behavior.run_init_pre(&mut cx),
            Stage::InitInter => behavior.run_init_inter(&mut cx),
            Stage::InitPost => behavior.run_init_post(&mut cx),
            Stage::Pre => behavior.run_pre(&mut cx),
            Stage::Inter => behavior.run_inter(&mut cx),
            Stage::Post => behavior.run_post(&mut cx),
        }
    }

    pub(crate) fn invoke_resolve(self: &Arc<Self>, candidates: &[RecallRef]) {
        self.bind_dependencies(candidates);
        let mut cx = ResolveContext {
            node: self,
            candidates,
        };
        self.behavior.lock().resolve_dependencies(&mut cx);
        self.lifecycle.lock().resolved = true;
    }

    pub(crate) fn mark_run_initialized(&self, cycle: &CycleInfo) {
        self.lifecycle.lock().run_initialized = true;
        *self.init_cycle.lock() = Some(CycleInfo { tic: None, ..*cycle });
    }

    /// Cycle the node's initialization stages ran with.
    pub fn init_cycle(&self) -> Option<CycleInfo> {
        *self.init_cycle.lock()
    }

    /// New instance of the same kind bound to `recall_id`.
    ///
    /// Capability flags, tags, provider, container and dependencies are
    /// copied; lifecycle starts over. The behavior is cloned and then told
    /// about the new id through [`Recall::duplicated`].
    pub fn duplicate(self: &Arc<Self>, recall_id: &RecallId) -> RecallRef {
        if !self.template {
            tracing::trace!(node = self.id, effect = self.effect, "duplicating an instance");
        }

        let mut behavior = dyn_clone::clone_box(&**self.behavior.lock());
        behavior.duplicated(recall_id);

        let dependencies = self
            .dependencies
            .lock()
            .iter()
            .map(RecallDependency::unresolved)
            .collect();

        Arc::new(RecallNode {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            effect: self.effect,
            kind: self.kind,
            template: false,
            propagate_done: AtomicFlag::new(self.propagate_done()),
            lifecycle: Mutex::new(Lifecycle::default()),
            init_cycle: Mutex::new(None),
            tags: Mutex::new(self.tags()),
            recall_id: Mutex::new(Some(*recall_id)),
            container: Mutex::new(self.container.lock().clone()),
            provider: self.provider.clone(),
            links: Mutex::new(Links::default()),
            dependencies: Mutex::new(dependencies),
            recycling_context: Mutex::new(self.recycling_context.lock().clone()),
            behavior: Mutex::new(behavior),
        })
    }

    /// Duplicates this node and, recursively, its children.
    pub fn duplicate_tree(self: &Arc<Self>, recall_id: &RecallId) -> RecallRef {
        let copy = self.duplicate(recall_id);
        for child in self.children() {
            let child_copy = child.duplicate_tree(recall_id);
            copy.add_child(&child_copy);
        }
        copy
    }

    /// Marks the node done, hidden and due for removal. Stays attached.
    pub fn done(&self) {
        if self.template {
            tracing::debug!(node = self.id, effect = self.effect, "template can't be done");
            return;
        }

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.done {
            return;
        }
        lifecycle.done = true;
        lifecycle.hide = true;
        lifecycle.remove = true;
        lifecycle.done_serial = NEXT_DONE_SERIAL.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(node = self.id, effect = self.effect, "done");
    }

    /// Cancels the children, then marks this node done.
    pub fn cancel(&self) {
        for child in self.children() {
            child.cancel();
        }
        self.done();
    }

    /// Detaches the node from its parent. A parent that propagates done and
    /// has no children left becomes done itself.
    pub fn remove(self: &Arc<Self>) {
        let parent = self.parent();
        if let Some(parent) = &parent {
            parent.detach_child(self);
        }
        self.lifecycle.lock().removed = true;

        if let Some(parent) = parent {
            if parent.propagate_done() && parent.links.lock().children.is_empty() {
                parent.done();
            }
        }
    }

    /// Attaches `child`, moving it away from a previous parent.
    ///
    /// The child takes over this node's domain tags and, unless it is a
    /// template, its recall id. A parent that propagates done passes that on.
    /// Attaching to a connected parent connects the child, and attaching to a
    /// run-initialized parent runs the child's initialization stages right
    /// away with the parent's format.
    pub fn add_child(self: &Arc<Self>, child: &RecallRef) {
        if Arc::ptr_eq(self, child) {
            tracing::debug!(node = self.id, "recall can't be its own child");
            return;
        }

        match child.parent() {
            Some(parent) if Arc::ptr_eq(&parent, self) => return,
            Some(parent) => parent.detach_child(child),
            None => {}
        }

        child.links.lock().parent = Arc::downgrade(self);
        self.links.lock().children.push(Arc::clone(child));

        let tags = self.tags();
        *child.tags.lock() = tags;

        if !child.template {
            if let Some(recall_id) = self.recall_id() {
                *child.recall_id.lock() = Some(recall_id);
            }
        }

        if self.propagate_done() {
            child.set_propagate_done(true);
        }

        let container = self.container.lock().clone();
        if container.upgrade().is_some() {
            *child.container.lock() = container;
        }

        if self.is_connected() {
            child.connect();
        }

        if self.is_run_initialized() && !child.template && !child.is_run_initialized() {
            let cycle = self.init_cycle().unwrap_or_default();
            scheduler::late_join(child, &cycle);
        }
    }

    /// Detaches `child` without any done propagation. A child leaving a
    /// connected parent is disconnected.
    pub fn detach_child(&self, child: &RecallRef) {
        let found = {
            let mut links = self.links.lock();
            let before = links.children.len();
            links.children.retain(|c| !Arc::ptr_eq(c, child));
            links.children.len() != before
        };
        if !found {
            return;
        }

        let mut links = child.links.lock();
        if core::ptr::eq(links.parent.as_ptr(), self) {
            links.parent = Weak::new();
        }
        drop(links);
        *child.tags.lock() = DomainTags::NONE;

        if self.is_connected() {
            child.disconnect();
        }
    }

    /// Marks this node and its subtree connected.
    pub fn connect(&self) {
        self.lifecycle.lock().connected = true;
        for child in self.children() {
            child.connect();
        }
    }

    pub fn disconnect(&self) {
        self.lifecycle.lock().connected = false;
        for child in self.children() {
            child.disconnect();
        }
    }
}

impl core::fmt::Debug for RecallNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallNode")
            .field("id", &self.id)
            .field("effect", &self.effect)
            .field("template", &self.template)
            .field("recall_id", &self.recall_id())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

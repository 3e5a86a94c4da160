//! Runs lifecycle hooks over a recall tree.
//!
//! Every stage is propagated depth-first in pre-order: a node's hook runs
//! before the hooks of its children, and the whole tree finishes one stage
//! before the next stage starts. Templates are never run.

use super::node::RecallRef;
use crate::compat::Arc;
use crate::output::CycleInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InitPre,
    InitInter,
    InitPost,
    Pre,
    Inter,
    Post,
}

impl Stage {
    pub const INIT: [Stage; 3] = [Stage::InitPre, Stage::InitInter, Stage::InitPost];
    pub const RUN: [Stage; 3] = [Stage::Pre, Stage::Inter, Stage::Post];

    pub fn is_init(&self) -> bool {
        matches!(self, Stage::InitPre | Stage::InitInter | Stage::InitPost)
    }
}

/// `root` and its descendants in depth-first pre-order.
pub fn subtree(root: &RecallRef) -> Vec<RecallRef> {
    let mut list = Vec::new();
    let mut stack = vec![Arc::clone(root)];
    while let Some(node) = stack.pop() {
        stack.extend(node.children().into_iter().rev());
        list.push(node);
    }
    list
}

/// Runs one stage over the tree rooted at `root`.
///
/// Done nodes skip their hook but their children are still visited. Run
/// stages skip nodes that have not been initialized, init stages skip nodes
/// that already have been.
pub fn propagate(root: &RecallRef, stage: Stage, cycle: &CycleInfo) {
    let mut stack = vec![Arc::clone(root)];

    while let Some(node) = stack.pop() {
        if node.is_template() {
            tracing::debug!(node = node.id(), effect = node.effect(), ?stage, "template not run");
            continue;
        }

        let lifecycle = node.lifecycle();
        let runnable = !lifecycle.done
            && !lifecycle.removed
            && lifecycle.run_initialized != stage.is_init();
        if runnable {
            node.invoke(stage, cycle);
        }

        stack.extend(node.children().into_iter().rev());
    }
}

/// Resolves the dependencies of every unresolved instance in the tree.
pub fn resolve(root: &RecallRef, candidates: &[RecallRef]) {
    for node in subtree(root) {
        if node.is_template() || node.lifecycle().resolved {
            continue;
        }
        node.invoke_resolve(candidates);
    }
}

/// Resolves dependencies, runs the three init stages and marks the tree
/// run-initialized.
pub fn run_init(root: &RecallRef, cycle: &CycleInfo) {
    if root.is_template() {
        tracing::debug!(node = root.id(), effect = root.effect(), "template not initialized");
        return;
    }

    let candidates = match (root.container(), root.recall_id()) {
        (Some(container), Some(recall_id)) => container.instances_in_group(recall_id.group_id()),
        _ => Vec::new(),
    };
    resolve(root, &candidates);

    for stage in Stage::INIT {
        propagate(root, stage, cycle);
    }

    for node in subtree(root) {
        if !node.is_template() {
            node.mark_run_initialized(cycle);
        }
    }
}

/// Initializes a node attached to an already running parent, with the
/// format the parent was initialized with.
pub(crate) fn late_join(node: &RecallRef, cycle: &CycleInfo) {
    tracing::trace!(node = node.id(), effect = node.effect(), "late join");
    run_init(node, cycle);
}

/// One cycle: the three run stages, then a removal sweep.
pub fn tick(root: &RecallRef, cycle: &CycleInfo) {
    if root.is_template() {
        tracing::debug!(node = root.id(), effect = root.effect(), "template not run");
        return;
    }

    for stage in Stage::RUN {
        propagate(root, stage, cycle);
    }
    sweep(root);
}

/// Removes every node flagged for removal, children before parents.
/// Returns the number of nodes removed.
pub fn sweep(root: &RecallRef) -> usize {
    let mut removed = 0;
    for node in subtree(root).iter().rev() {
        let lifecycle = node.lifecycle();
        if lifecycle.remove && !lifecycle.removed {
            node.remove();
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::Mutex;
    use crate::recall::node::tests::{recall_id, Probe};
    use crate::recall::{RecallGroup, RecallNode};

    fn tree(log: &Arc<Mutex<Vec<String>>>) -> (RecallRef, RecallRef, RecallRef, RecallRef) {
        let id = recall_id();
        let root = RecallNode::instance(Probe::new("root", log), id);
        let a = RecallNode::instance(Probe::new("a", log), id);
        let b = RecallNode::instance(Probe::new("b", log), id);
        let a1 = RecallNode::instance(Probe::new("a1", log), id);
        root.add_child(&a);
        root.add_child(&b);
        a.add_child(&a1);
        (root, a, b, a1)
    }

    #[test]
    fn test_subtree_is_pre_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (root, a, b, a1) = tree(&log);
        let ids: Vec<_> = subtree(&root).iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![root.id(), a.id(), a1.id(), b.id()]);
    }

    #[test]
    fn test_run_init_stage_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (root, a, _, a1) = tree(&log);

        run_init(&root, &CycleInfo::default());

        let expected: Vec<String> = ["init_pre", "init_inter", "init_post"]
            .iter()
            .flat_map(|stage| {
                ["root", "a", "a1", "b"]
                    .iter()
                    .map(move |name| format!("{name}:{stage}"))
            })
            .collect();
        assert_eq!(*log.lock(), expected);
        assert!(root.is_run_initialized());
        assert!(a.is_run_initialized());
        assert!(a1.is_run_initialized());
    }

    #[test]
    fn test_tick_runs_stages_once_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (root, ..) = tree(&log);
        run_init(&root, &CycleInfo::default());
        log.lock().clear();

        tick(&root, &CycleInfo::default());

        let log = log.lock();
        assert_eq!(log.len(), 12);
        assert_eq!(log[0], "root:pre");
        assert_eq!(log[3], "b:pre");
        assert_eq!(log[4], "root:inter");
        assert_eq!(log[11], "b:post");
    }

    #[test]
    fn test_tick_skips_uninitialized_and_done() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (root, a, ..) = tree(&log);

        tick(&root, &CycleInfo::default());
        assert!(log.lock().is_empty());

        run_init(&root, &CycleInfo::default());
        log.lock().clear();
        a.set_propagate_done(false);
        a.done();
        propagate(&root, Stage::Pre, &CycleInfo::default());
        assert_eq!(*log.lock(), vec!["root:pre", "a1:pre", "b:pre"]);
    }

    #[test]
    fn test_templates_are_never_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let template = RecallNode::template(Probe::new("template", &log));
        run_init(&template, &CycleInfo::default());
        tick(&template, &CycleInfo::default());
        assert!(log.lock().is_empty());
        assert!(!template.is_run_initialized());
    }

    #[test]
    fn test_sweep_removes_children_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (root, a, b, a1) = tree(&log);
        a.set_propagate_done(true);
        a1.done();

        assert_eq!(sweep(&root), 2);
        assert!(a1.is_removed());
        assert!(a.is_removed());
        assert!(!b.is_removed());
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_sweep_root() {
        let root = RecallNode::instance(RecallGroup, recall_id());
        root.done();
        tick(&root, &CycleInfo::default());
        assert!(root.is_removed());
    }
}

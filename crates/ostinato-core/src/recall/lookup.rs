//! Linear lookups over flat recall lists.
//!
//! Each function returns the first match. Pass the remainder of the list
//! after a hit to continue searching.

use super::node::{Provider, Recall, RecallRef};
use super::{GroupId, RecallId};

fn group_of(node: &RecallRef) -> Option<GroupId> {
    node.recall_id().map(|id| id.group_id())
}

/// First recall with `effect` whose group matches `recall_id`'s, or that
/// carries no recall id when `recall_id` is `None`.
pub fn find_by_effect<'a>(
    list: &'a [RecallRef],
    recall_id: Option<&RecallId>,
    effect: &str,
) -> Option<&'a RecallRef> {
    let group = recall_id.map(|id| id.group_id());
    list.iter()
        .find(|node| node.effect() == effect && group_of(node) == group)
}

pub fn find_type<'a, T: Recall>(list: &'a [RecallRef]) -> Option<&'a RecallRef> {
    list.iter().find(|node| node.is_kind::<T>())
}

/// Like [`find_type`] but only matches templates.
pub fn template_find_type<'a, T: Recall>(list: &'a [RecallRef]) -> Option<&'a RecallRef> {
    list.iter()
        .find(|node| node.is_template() && node.is_kind::<T>())
}

pub fn find_type_with_group_id<'a, T: Recall>(
    list: &'a [RecallRef],
    group_id: GroupId,
) -> Option<&'a RecallRef> {
    list.iter()
        .find(|node| node.is_kind::<T>() && group_of(node) == Some(group_id))
}

pub fn find_group_id(list: &[RecallRef], group_id: GroupId) -> Option<&RecallRef> {
    list.iter().find(|node| group_of(node) == Some(group_id))
}

pub fn find_provider<'a>(list: &'a [RecallRef], provider: &Provider) -> Option<&'a RecallRef> {
    list.iter()
        .find(|node| node.provider().is_some_and(|p| p.ptr_eq(provider)))
}

pub fn template_find_provider<'a>(
    list: &'a [RecallRef],
    provider: &Provider,
) -> Option<&'a RecallRef> {
    list.iter().find(|node| {
        node.is_template() && node.provider().is_some_and(|p| p.ptr_eq(provider))
    })
}

pub fn find_provider_with_group_id<'a>(
    list: &'a [RecallRef],
    provider: &Provider,
    group_id: GroupId,
) -> Option<&'a RecallRef> {
    list.iter().find(|node| {
        group_of(node) == Some(group_id) && node.provider().is_some_and(|p| p.ptr_eq(provider))
    })
}

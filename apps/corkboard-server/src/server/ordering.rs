//! Ordering commands for every level of the tree. Each one reads a sibling
//! snapshot, recomputes positions with the core sequencer and lands a single
//! guarded commit; the realtime notify happens only after that commit.

use corkboard_core::{
    append_position, remove_and_repack, reorder_within_container, BoardId, BoardRole, CardId,
    Container, Item, ItemKind, ItemTitle, ListId, Slot, SubTaskId, TaskId, UserId,
};
use serde_json::json;
use tracing::warn;

use super::{
    errors::{business_rule, ServiceError},
    guard::{CardAction, PermissionGuard},
    hierarchy::{collect_subtree, container_card, enclosing_board},
    metrics::record_ordering_conflict,
    realtime::{Audience, RealtimeNotifier},
    store::{Change, ChangeSet, Placement, Repository, Siblings, VersionKey},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Authorizes reading or writing the children of `container` and returns
/// the board it belongs to. Lists in a board and cards in a list follow the
/// board role; tasks and subtasks follow the owning card.
pub(crate) async fn authorize_children<R: Repository>(
    repo: &R,
    actor: UserId,
    container: Container,
    access: Access,
) -> Result<BoardId, ServiceError> {
    let guard = PermissionGuard::new(repo);
    if let Some(card) = container_card(repo, container).await? {
        let action = match access {
            Access::Read => CardAction::View,
            Access::Write => CardAction::Edit,
        };
        return Ok(guard.ensure_card(card, actor, action).await?.board);
    }

    let board = enclosing_board(repo, container).await?;
    let minimum = match access {
        Access::Read => BoardRole::Viewer,
        Access::Write => BoardRole::Editor,
    };
    guard.ensure_board(board, actor, minimum).await?;
    Ok(board)
}

/// Deleting or archiving a card needs card delete rights; anything else
/// needs write access to its parent.
async fn authorize_removal<R: Repository>(
    repo: &R,
    actor: UserId,
    item: Item,
    parent: Container,
) -> Result<BoardId, ServiceError> {
    match item {
        Item::Card(card) => Ok(PermissionGuard::new(repo)
            .ensure_card_delete(card, actor)
            .await?
            .board),
        _ => authorize_children(repo, actor, parent, Access::Write).await,
    }
}

pub(crate) async fn commit_ordering<R: Repository>(
    repo: &R,
    changes: ChangeSet,
    operation: &'static str,
) -> Result<(), ServiceError> {
    match repo.commit(changes).await {
        Err(ServiceError::Conflict) => {
            record_ordering_conflict(operation);
            warn!(
                event = "ordering.conflict",
                operation, "sibling snapshot changed before commit"
            );
            Err(ServiceError::Conflict)
        }
        other => other,
    }
}

/// Counts and logs a command that lost a race before it could commit.
pub(crate) fn stale(operation: &'static str, item: Item) -> ServiceError {
    record_ordering_conflict(operation);
    warn!(
        event = "ordering.conflict",
        operation,
        item = %item,
        "item left the container it was located in"
    );
    ServiceError::Conflict
}

/// An item's placement tied to the children version of its parent.
/// Guarding a commit on `version` fails it if the item has since moved.
#[derive(Debug, Clone)]
pub(crate) struct Pinned {
    pub(crate) placement: Placement,
    pub(crate) version: u64,
    /// Live siblings; `None` when the parent itself is archived.
    pub(crate) siblings: Option<Siblings>,
}

impl Pinned {
    pub(crate) fn parent_key(&self) -> VersionKey {
        VersionKey::Children(self.placement.parent)
    }
}

/// Locates `item` and reads its parent's children version, then checks the
/// item is still under that parent. A move that lands between the two reads
/// is reported as a conflict instead of leaking a stale placement.
pub(crate) async fn pin_item<R: Repository>(
    repo: &R,
    item: Item,
    operation: &'static str,
) -> Result<Pinned, ServiceError> {
    let placement = repo.locate(item).await?.ok_or(ServiceError::NotFound)?;
    let siblings = repo.load_siblings(placement.parent).await?;
    let version = match &siblings {
        Some(siblings) => siblings.version,
        None => repo
            .version(VersionKey::Children(placement.parent))
            .await?
            .ok_or(ServiceError::NotFound)?,
    };

    let still_there = match &siblings {
        Some(siblings) if !placement.archived => {
            siblings.slots.iter().any(|slot| slot.id == item)
        }
        _ => repo.locate(item).await? == Some(placement),
    };
    if !still_there {
        return Err(stale(operation, item));
    }
    Ok(Pinned {
        placement,
        version,
        siblings,
    })
}

fn new_item(kind: ItemKind) -> Item {
    match kind {
        ItemKind::List => Item::List(ListId::new()),
        ItemKind::Card => Item::Card(CardId::new()),
        ItemKind::Task => Item::Task(TaskId::new()),
        ItemKind::SubTask => Item::SubTask(SubTaskId::new()),
    }
}

pub(crate) async fn create_item<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    parent: Container,
    title: ItemTitle,
) -> Result<Slot<Item>, ServiceError> {
    let board = authorize_children(repo, actor, parent, Access::Write).await?;
    let siblings = repo
        .load_siblings(parent)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let slot = Slot::new(new_item(parent.child_kind()), append_position(&siblings.slots));
    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Children(parent), siblings.version)
        .push(Change::InsertItem {
            item: slot.id,
            parent,
            position: slot.position,
            title: title.clone(),
        });
    commit_ordering(repo, changes, "create").await?;

    tracing::info!(event = "ordering.create", item = %slot.id, parent = %parent, position = slot.position);
    notifier
        .notify(
            &[Audience::Board(board)],
            "item_create",
            json!({
                "item": slot.id,
                "parent": parent,
                "position": slot.position,
                "title": title.as_str(),
            }),
        )
        .await;
    Ok(slot)
}

/// Moves `item` to `new_index` among its live siblings and returns the
/// resulting order. Nothing is written when the order does not change.
pub(crate) async fn reorder_item<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
    new_index: i64,
) -> Result<Vec<Slot<Item>>, ServiceError> {
    let pinned = pin_item(repo, item, "reorder").await?;
    if pinned.placement.archived {
        return Err(ServiceError::NotFound);
    }
    let placement = pinned.placement;
    let parent_key = pinned.parent_key();
    let board = authorize_children(repo, actor, placement.parent, Access::Write).await?;
    let mut siblings = pinned.siblings.ok_or(ServiceError::NotFound)?;

    let changed = reorder_within_container(&mut siblings.slots, item, new_index);
    if changed.is_empty() {
        return Ok(siblings.slots);
    }

    let mut changes = ChangeSet::new();
    changes.guard(parent_key, siblings.version).reposition(&changed);
    commit_ordering(repo, changes, "reorder").await?;

    notifier
        .notify(
            &[Audience::Board(board)],
            "item_reorder",
            json!({ "container": placement.parent, "items": siblings.slots }),
        )
        .await;
    Ok(siblings.slots)
}

/// Removes `item` with its whole subtree and closes the gap it leaves.
pub(crate) async fn delete_item<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
) -> Result<usize, ServiceError> {
    let pinned = pin_item(repo, item, "delete").await?;
    let placement = pinned.placement;
    let board = authorize_removal(repo, actor, item, placement.parent).await?;

    let mut changes = ChangeSet::new();
    changes.guard(pinned.parent_key(), pinned.version);
    if let Some(mut siblings) = pinned.siblings {
        let changed = remove_and_repack(&mut siblings.slots, item);
        changes.reposition(&changed);
    }

    let subtree = collect_subtree(repo, item).await?;
    for (key, version) in &subtree.versions {
        changes.guard(*key, *version);
    }
    changes.extend(subtree.items.iter().rev().map(|node| Change::DeleteItem(*node)));
    commit_ordering(repo, changes, "delete").await?;

    let removed = subtree.items.len();
    tracing::info!(event = "ordering.delete", item = %item, removed);
    notifier
        .notify(
            &[Audience::Board(board)],
            "item_delete",
            json!({ "item": item, "parent": placement.parent, "removed": removed }),
        )
        .await;
    Ok(removed)
}

/// Soft-deletes a card, task or subtask. Returns `false` when it was
/// already archived.
pub(crate) async fn archive_item<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
) -> Result<bool, ServiceError> {
    if !item.kind().supports_archive() {
        return Err(ServiceError::InvalidRequest);
    }
    let pinned = pin_item(repo, item, "archive").await?;
    let placement = pinned.placement;
    let board = authorize_removal(repo, actor, item, placement.parent).await?;
    if placement.archived {
        return Ok(false);
    }

    let mut changes = ChangeSet::new();
    changes.guard(pinned.parent_key(), pinned.version);
    let mut position = 0;
    if let Some(mut siblings) = pinned.siblings {
        if let Some(slot) = siblings.slots.iter().find(|slot| slot.id == item) {
            position = slot.position;
        }
        let changed = remove_and_repack(&mut siblings.slots, item);
        changes.reposition(&changed);
    }
    changes.push(Change::SetArchived {
        item,
        archived: true,
        position,
    });
    commit_ordering(repo, changes, "archive").await?;

    notifier
        .notify(
            &[Audience::Board(board)],
            "item_archive",
            json!({ "item": item, "parent": placement.parent }),
        )
        .await;
    Ok(true)
}

/// Brings an archived item back at the end of its parent. Returns `false`
/// when it was not archived.
pub(crate) async fn restore_item<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
) -> Result<bool, ServiceError> {
    if !item.kind().supports_archive() {
        return Err(ServiceError::InvalidRequest);
    }
    let pinned = pin_item(repo, item, "restore").await?;
    let placement = pinned.placement;
    let board = authorize_removal(repo, actor, item, placement.parent).await?;
    if !placement.archived {
        return Ok(false);
    }

    let Some(siblings) = pinned.siblings else {
        return Err(business_rule(
            "archived_parent",
            format!(
                "restore the parent {} before restoring this {}",
                placement.parent.kind_str(),
                item.kind().as_str()
            ),
        ));
    };
    let position = append_position(&siblings.slots);
    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Children(placement.parent), siblings.version)
        .push(Change::SetArchived {
            item,
            archived: false,
            position,
        });
    commit_ordering(repo, changes, "restore").await?;

    notifier
        .notify(
            &[Audience::Board(board)],
            "item_restore",
            json!({ "item": item, "parent": placement.parent, "position": position }),
        )
        .await;
    Ok(true)
}

pub(crate) async fn list_children<R: Repository>(
    repo: &R,
    actor: UserId,
    container: Container,
) -> Result<Vec<Slot<Item>>, ServiceError> {
    authorize_children(repo, actor, container, Access::Read).await?;
    Ok(repo
        .load_siblings(container)
        .await?
        .ok_or(ServiceError::NotFound)?
        .slots)
}

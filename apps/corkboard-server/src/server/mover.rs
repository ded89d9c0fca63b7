//! Moves an item from one container to another of the same kind, across
//! boards if needed.

use std::collections::HashSet;

use corkboard_core::{
    insert_and_repack, remove_and_repack, Container, Item, Scope, UserId,
};
use serde_json::json;
use tracing::info;

use super::{
    errors::ServiceError,
    guard::PermissionGuard,
    hierarchy::{collect_subtree, enclosing_board},
    ordering::{commit_ordering, pin_item, reorder_item, stale},
    realtime::{Audience, RealtimeNotifier},
    store::{Change, ChangeSet, Repository, VersionKey},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MoveOutcome {
    pub(crate) position: u32,
    /// Assignments dropped because the user is not a member of the
    /// destination board.
    pub(crate) removed_assignees: Vec<(Item, UserId)>,
}

/// Closes the gap in `from`, inserts `item` into `to` at the clamped
/// `new_index` and, when the boards differ, strips assignees who cannot see
/// the destination board. Everything lands in one commit.
///
/// Moving always needs editor rights on both boards; card assignees may
/// work inside a card but never carry its contents elsewhere.
pub(crate) async fn move_across_containers<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
    from: Container,
    to: Container,
    new_index: i64,
) -> Result<MoveOutcome, ServiceError> {
    if from.child_kind() != item.kind() || to.child_kind() != item.kind() {
        return Err(ServiceError::InvalidRequest);
    }
    let pinned = pin_item(repo, item, "move").await?;
    if pinned.placement.archived {
        return Err(ServiceError::NotFound);
    }

    let guard = PermissionGuard::new(repo);
    let source_board = enclosing_board(repo, from).await?;
    guard.ensure_board_editor(source_board, actor).await?;
    if pinned.placement.parent != from {
        return Err(stale("move", item));
    }
    if from == to {
        let slots = reorder_item(repo, notifier, actor, item, new_index).await?;
        let position = slots
            .iter()
            .find(|slot| slot.id == item)
            .map_or(0, |slot| slot.position);
        return Ok(MoveOutcome {
            position,
            removed_assignees: Vec::new(),
        });
    }
    let target_board = enclosing_board(repo, to).await?;
    guard.ensure_board_editor(target_board, actor).await?;

    let mut source = pinned.siblings.ok_or(ServiceError::NotFound)?;
    let mut target = repo.load_siblings(to).await?.ok_or(ServiceError::NotFound)?;

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Children(from), source.version)
        .guard(VersionKey::Children(to), target.version);

    let closed = remove_and_repack(&mut source.slots, item);
    changes.reposition(&closed);

    let mut position = 0;
    for slot in insert_and_repack(&mut target.slots, item, new_index) {
        if slot.id == item {
            position = slot.position;
            changes.push(Change::Reparent {
                item,
                parent: to,
                position: slot.position,
            });
        } else {
            changes.push(Change::SetPosition {
                item: slot.id,
                position: slot.position,
            });
        }
    }

    let mut removed_assignees = Vec::new();
    if source_board != target_board {
        let members_key = VersionKey::Members(Scope::Board(target_board));
        let members_version = repo
            .version(members_key)
            .await?
            .ok_or(ServiceError::NotFound)?;
        changes.guard(members_key, members_version);

        let subtree = collect_subtree(repo, item).await?;
        for (key, version) in &subtree.versions {
            changes.guard(*key, *version);
        }
        let members: HashSet<UserId> = repo
            .board_members(target_board)
            .await?
            .into_iter()
            .map(|(user, _)| user)
            .collect();
        removed_assignees = repo
            .assignees(&subtree.items)
            .await?
            .into_iter()
            .filter(|(_, user)| !members.contains(user))
            .collect();
        changes.extend(
            removed_assignees
                .iter()
                .map(|(item, user)| Change::RemoveAssignee {
                    item: *item,
                    user: *user,
                }),
        );
    }
    commit_ordering(repo, changes, "move").await?;

    info!(
        event = "ordering.move",
        item = %item,
        from = %from,
        to = %to,
        position,
        removed_assignees = removed_assignees.len()
    );
    let audiences = if source_board == target_board {
        vec![Audience::Board(source_board)]
    } else {
        vec![Audience::Board(source_board), Audience::Board(target_board)]
    };
    let removed: Vec<_> = removed_assignees
        .iter()
        .map(|(item, user)| json!({ "item": item, "user_id": user.to_string() }))
        .collect();
    notifier
        .notify(
            &audiences,
            "item_move",
            json!({
                "item": item,
                "from": from,
                "to": to,
                "position": position,
                "removed_assignees": removed,
            }),
        )
        .await;

    Ok(MoveOutcome {
        position,
        removed_assignees,
    })
}

#[cfg(test)]
mod tests {
    use corkboard_core::{BoardRole, Container, Item, WorkspaceRole};

    use super::move_across_containers;
    use crate::server::{
        cards::assign,
        errors::ServiceError,
        realtime::Audience,
        store::Repository,
        test_support::{Fixture, Interleaved, Pause},
    };

    fn container(item: Item) -> Container {
        item.as_container().unwrap()
    }

    #[tokio::test]
    async fn moving_between_lists_repacks_both_sides() {
        let fixture = Fixture::new().await;
        let todo = fixture.list().await;
        let done = fixture.list().await;
        let a = fixture.child(todo).await;
        let b = fixture.child(todo).await;
        let c = fixture.child(todo).await;
        let x = fixture.child(done).await;

        let outcome = move_across_containers(
            &fixture.store,
            &fixture.notifier,
            fixture.owner,
            a,
            container(todo),
            container(done),
            99,
        )
        .await
        .unwrap();

        assert_eq!(outcome.position, 1);
        assert!(outcome.removed_assignees.is_empty());
        assert_eq!(fixture.order(container(todo)).await, vec![(b, 0), (c, 1)]);
        assert_eq!(fixture.order(container(done)).await, vec![(x, 0), (a, 1)]);

        let sent = fixture.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "item_move");
        assert_eq!(sent[0].audiences, vec![Audience::Board(fixture.board)]);
    }

    #[tokio::test]
    async fn rejects_mismatched_kinds_and_stale_sources() {
        let fixture = Fixture::new().await;
        let todo = fixture.list().await;
        let done = fixture.list().await;
        let card = fixture.child(todo).await;
        let task = fixture.child(card).await;

        assert_eq!(
            move_across_containers(
                &fixture.store,
                &fixture.notifier,
                fixture.owner,
                card,
                container(todo),
                container(task),
                0,
            )
            .await
            .unwrap_err(),
            ServiceError::InvalidRequest
        );
        assert_eq!(
            move_across_containers(
                &fixture.store,
                &fixture.notifier,
                fixture.owner,
                card,
                container(done),
                container(todo),
                0,
            )
            .await
            .unwrap_err(),
            ServiceError::Conflict
        );
        assert!(fixture.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn same_container_degrades_to_reorder() {
        let fixture = Fixture::new().await;
        let todo = fixture.list().await;
        let a = fixture.child(todo).await;
        let b = fixture.child(todo).await;

        let outcome = move_across_containers(
            &fixture.store,
            &fixture.notifier,
            fixture.owner,
            b,
            container(todo),
            container(todo),
            -5,
        )
        .await
        .unwrap();
        assert_eq!(outcome.position, 0);
        assert_eq!(fixture.order(container(todo)).await, vec![(b, 0), (a, 1)]);
        assert_eq!(fixture.notifier.event_types(), vec!["item_reorder"]);
    }

    #[tokio::test]
    async fn cross_board_move_needs_editor_on_both_boards() {
        let fixture = Fixture::new().await;
        let other = fixture.second_board().await;
        let source = fixture.list().await;
        let target = fixture.item_in(Container::Board(other)).await;
        let card = fixture.child(source).await;
        let editor = fixture.board_member(BoardRole::Editor).await;
        fixture.put_board_role(other, editor, BoardRole::Viewer).await;

        assert_eq!(
            move_across_containers(
                &fixture.store,
                &fixture.notifier,
                editor,
                card,
                container(source),
                container(target),
                0,
            )
            .await
            .unwrap_err(),
            ServiceError::Forbidden
        );
        assert_eq!(fixture.order(container(source)).await, vec![(card, 0)]);
    }

    #[tokio::test]
    async fn cross_board_move_drops_assignees_without_destination_access() {
        let fixture = Fixture::new().await;
        let other = fixture.second_board().await;
        let source = fixture.list().await;
        let target = fixture.item_in(Container::Board(other)).await;
        let card = fixture.child(source).await;
        let task = fixture.child(card).await;
        let subtask = fixture.child(task).await;

        let stays = fixture.board_member(BoardRole::Editor).await;
        fixture.put_board_role(other, stays, BoardRole::Viewer).await;
        let leaves = fixture.board_member(BoardRole::Editor).await;
        fixture.assign(card, stays).await;
        fixture.assign(card, leaves).await;
        fixture.assign(subtask, leaves).await;

        let outcome = move_across_containers(
            &fixture.store,
            &fixture.notifier,
            fixture.owner,
            card,
            container(source),
            container(target),
            0,
        )
        .await
        .unwrap();

        let mut removed = outcome.removed_assignees.clone();
        removed.sort_by_key(|(item, _)| item.id_string());
        let mut expected = vec![(card, leaves), (subtask, leaves)];
        expected.sort_by_key(|(item, _)| item.id_string());
        assert_eq!(removed, expected);

        let remaining = fixture
            .store
            .assignees(&[card, task, subtask])
            .await
            .unwrap();
        assert_eq!(remaining, vec![(card, stays)]);
        assert_eq!(
            fixture.store.locate(card).await.unwrap().unwrap().parent,
            container(target)
        );
        assert_eq!(
            fixture.notifier.sent()[0].audiences,
            vec![Audience::Board(fixture.board), Audience::Board(other)]
        );
    }

    #[tokio::test]
    async fn moving_a_list_to_another_board_carries_its_cards() {
        let fixture = Fixture::new().await;
        let other = fixture.second_board().await;
        let list = fixture.list().await;
        let card = fixture.child(list).await;
        let admin = fixture.workspace_member(WorkspaceRole::Admin).await;

        move_across_containers(
            &fixture.store,
            &fixture.notifier,
            admin,
            list,
            Container::Board(fixture.board),
            Container::Board(other),
            0,
        )
        .await
        .unwrap();

        assert!(fixture.order(Container::Board(fixture.board)).await.is_empty());
        assert_eq!(fixture.order(Container::Board(other)).await, vec![(list, 0)]);
        assert_eq!(fixture.order(container(list)).await, vec![(card, 0)]);
    }

    #[tokio::test]
    async fn a_move_that_loses_the_item_midway_is_rejected() {
        let fixture = Fixture::new().await;
        let todo = fixture.list().await;
        let doing = fixture.list().await;
        let done = fixture.list().await;
        let a = fixture.child(todo).await;
        let b = fixture.child(todo).await;
        let x = fixture.child(done).await;
        let (todo, doing, done) = (container(todo), container(doing), container(done));

        let store = fixture.store.clone();
        let notifier = fixture.notifier.clone();
        let owner = fixture.owner;
        let racing = Interleaved::new(
            &fixture.store,
            Pause::BeforeLoadSiblings(todo),
            async move {
                move_across_containers(&store, &notifier, owner, a, todo, done, 1)
                    .await
                    .unwrap();
            },
        );
        assert_eq!(
            move_across_containers(&racing, &fixture.notifier, fixture.owner, a, todo, doing, 0)
                .await
                .unwrap_err(),
            ServiceError::Conflict
        );

        assert!(racing.fired());
        assert_eq!(fixture.order(todo).await, vec![(b, 0)]);
        assert_eq!(fixture.order(done).await, vec![(x, 0), (a, 1)]);
        assert!(fixture.order(doing).await.is_empty());
        assert_eq!(fixture.notifier.event_types(), vec!["item_move"]);
    }

    #[tokio::test]
    async fn assignment_landing_during_a_cross_board_move_fails_the_move() {
        let fixture = Fixture::new().await;
        let other = fixture.second_board().await;
        let source = fixture.list().await;
        let target = fixture.item_in(Container::Board(other)).await;
        let card = fixture.child(source).await;
        let outsider = fixture.board_member(BoardRole::Editor).await;

        let store = fixture.store.clone();
        let notifier = fixture.notifier.clone();
        let owner = fixture.owner;
        let racing = Interleaved::new(
            &fixture.store,
            Pause::AfterAssignees,
            async move {
                assert!(assign(&store, &notifier, owner, card, outsider).await.unwrap());
            },
        );
        assert_eq!(
            move_across_containers(
                &racing,
                &fixture.notifier,
                fixture.owner,
                card,
                container(source),
                container(target),
                0,
            )
            .await
            .unwrap_err(),
            ServiceError::Conflict
        );

        assert!(racing.fired());
        assert_eq!(
            fixture.store.locate(card).await.unwrap().unwrap().parent,
            container(source)
        );
        assert_eq!(
            fixture.store.assignees(&[card]).await.unwrap(),
            vec![(card, outsider)]
        );
    }

    #[tokio::test]
    async fn card_assignees_cannot_move_its_tasks() {
        let fixture = Fixture::new().await;
        let other = fixture.second_board().await;
        let list = fixture.list().await;
        let home = fixture.child(list).await;
        let away = fixture.child(list).await;
        let elsewhere = fixture.child(fixture.item_in(Container::Board(other)).await).await;
        let task = fixture.child(home).await;
        let helper = fixture.workspace_member(WorkspaceRole::Member).await;
        fixture.assign(home, helper).await;
        fixture.assign(away, helper).await;
        fixture.assign(elsewhere, helper).await;

        for destination in [home, away, elsewhere] {
            assert_eq!(
                move_across_containers(
                    &fixture.store,
                    &fixture.notifier,
                    helper,
                    task,
                    container(home),
                    container(destination),
                    0,
                )
                .await
                .unwrap_err(),
                ServiceError::Forbidden
            );
        }
        assert_eq!(fixture.order(container(home)).await, vec![(task, 0)]);
        assert!(fixture.notifier.sent().is_empty());
    }
}

use corkboard_core::{
    BoardId, CardDescription, CardId, CommentBody, CommentId, Container, Item, ItemTitle, Scope, Slot,
    UserId,
};
use serde_json::json;
use tracing::info;

use super::{
    core::now_unix,
    errors::{business_rule, ServiceError},
    guard::PermissionGuard,
    hierarchy::{item_board, owning_card},
    ordering::{commit_ordering, pin_item},
    realtime::{Audience, RealtimeNotifier},
    store::{CardDetails, Change, ChangeSet, CommentView, Repository, VersionKey},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CardView {
    pub(crate) details: CardDetails,
    pub(crate) assignees: Vec<UserId>,
    /// Live tasks in order; empty while the card is archived.
    pub(crate) tasks: Vec<Slot<Item>>,
}

pub(crate) async fn update_card<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    card: CardId,
    title: Option<ItemTitle>,
    description: Option<CardDescription>,
) -> Result<CardDetails, ServiceError> {
    if title.is_none() && description.is_none() {
        return Err(ServiceError::InvalidRequest);
    }
    let access = PermissionGuard::new(repo)
        .ensure_card_edit(card, actor)
        .await?;

    let mut changes = ChangeSet::new();
    changes.push(Change::UpdateCard {
        card,
        title,
        description,
    });
    repo.commit(changes).await?;

    let details = repo
        .card_details(card)
        .await?
        .ok_or(ServiceError::NotFound)?;
    info!(event = "card.update", card_id = %card, user_id = %actor);
    notifier
        .notify(
            &[Audience::Board(access.board)],
            "card_update",
            json!({
                "card_id": card,
                "title": details.title,
                "description": details.description,
            }),
        )
        .await;
    Ok(details)
}

pub(crate) async fn card_details<R: Repository>(
    repo: &R,
    actor: UserId,
    card: CardId,
) -> Result<CardView, ServiceError> {
    PermissionGuard::new(repo)
        .ensure_card_view(card, actor)
        .await?;
    let details = repo
        .card_details(card)
        .await?
        .ok_or(ServiceError::NotFound)?;
    let assignees = repo
        .assignees(&[Item::Card(card)])
        .await?
        .into_iter()
        .map(|(_, user)| user)
        .collect();
    let tasks = repo
        .load_siblings(Container::Card(card))
        .await?
        .map(|siblings| siblings.slots)
        .unwrap_or_default();
    Ok(CardView {
        details,
        assignees,
        tasks,
    })
}

/// Assigns `user` to a card, task or subtask. Returns `false` when the
/// assignment already existed.
///
/// The commit is guarded on the children version of the item's parent,
/// which every move of the item or one of its ancestors bumps.
pub(crate) async fn assign<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
    user: UserId,
) -> Result<bool, ServiceError> {
    let card = owning_card(repo, item).await?;
    let access = PermissionGuard::new(repo)
        .ensure_card_assign(card, actor)
        .await?;
    if !repo.user_exists(user).await? {
        return Err(ServiceError::NotFound);
    }

    let pinned = pin_item(repo, item, "assign").await?;
    let members_key = VersionKey::Members(Scope::Workspace(access.workspace));
    let version = repo
        .version(members_key)
        .await?
        .ok_or(ServiceError::NotFound)?;
    if repo.workspace_role(access.workspace, user).await?.is_none() {
        return Err(business_rule(
            "assignee_not_member",
            "assignees must be members of the workspace",
        ));
    }
    if repo
        .assignees(&[item])
        .await?
        .iter()
        .any(|(_, assignee)| *assignee == user)
    {
        return Ok(false);
    }

    let mut changes = ChangeSet::new();
    changes
        .guard(members_key, version)
        .guard(pinned.parent_key(), pinned.version)
        .push(Change::AddAssignee { item, user });
    commit_ordering(repo, changes, "assign").await?;

    info!(event = "assignee.add", item = %item, user_id = %user);
    notify_assignee(notifier, access.board, item, user, true).await;
    Ok(true)
}

/// Anyone may drop their own assignment; dropping someone else's needs
/// assign rights on the owning card.
pub(crate) async fn unassign<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    item: Item,
    user: UserId,
) -> Result<bool, ServiceError> {
    let card = owning_card(repo, item).await?;
    let board = if actor == user {
        item_board(repo, item).await?
    } else {
        PermissionGuard::new(repo)
            .ensure_card_assign(card, actor)
            .await?
            .board
    };
    let pinned = pin_item(repo, item, "unassign").await?;
    if !repo
        .assignees(&[item])
        .await?
        .iter()
        .any(|(_, assignee)| *assignee == user)
    {
        return Ok(false);
    }

    let mut changes = ChangeSet::new();
    changes
        .guard(pinned.parent_key(), pinned.version)
        .push(Change::RemoveAssignee { item, user });
    commit_ordering(repo, changes, "unassign").await?;

    info!(event = "assignee.remove", item = %item, user_id = %user);
    notify_assignee(notifier, board, item, user, false).await;
    Ok(true)
}

async fn notify_assignee<N: RealtimeNotifier>(
    notifier: &N,
    board: BoardId,
    item: Item,
    user: UserId,
    assigned: bool,
) {
    notifier
        .notify(
            &[Audience::Board(board), Audience::User(user)],
            "assignee_update",
            json!({ "item": item, "user_id": user, "assigned": assigned }),
        )
        .await;
}

pub(crate) async fn add_comment<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    card: CardId,
    body: CommentBody,
) -> Result<CommentView, ServiceError> {
    let access = PermissionGuard::new(repo)
        .ensure_card_comment(card, actor)
        .await?;

    let view = CommentView {
        comment: CommentId::new(),
        author: actor,
        body: body.as_str().to_owned(),
        created_at_unix: now_unix(),
    };
    let mut changes = ChangeSet::new();
    changes.push(Change::AddComment {
        comment: view.comment,
        card,
        author: actor,
        body,
        created_at_unix: view.created_at_unix,
    });
    repo.commit(changes).await?;

    info!(event = "comment.create", card_id = %card, comment_id = %view.comment);
    notifier
        .notify(
            &[Audience::Board(access.board)],
            "comment_create",
            json!({
                "card_id": card,
                "comment_id": view.comment,
                "author": actor,
                "body": view.body,
                "created_at_unix": view.created_at_unix,
            }),
        )
        .await;
    Ok(view)
}

pub(crate) async fn list_comments<R: Repository>(
    repo: &R,
    actor: UserId,
    card: CardId,
) -> Result<Vec<CommentView>, ServiceError> {
    PermissionGuard::new(repo)
        .ensure_card_view(card, actor)
        .await?;
    repo.comments(card).await
}

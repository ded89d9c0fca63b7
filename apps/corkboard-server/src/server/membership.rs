//! Membership commands for workspaces and boards. Every role write goes
//! through [`RoleEscalationGuard`]; every removal or demotion goes through
//! [`OwnershipInvariant`].

use corkboard_core::{
    BoardId, BoardName, BoardRole, Container, Item, Scope, ScopeRole, Slot, UserId, WorkspaceId,
    WorkspaceName, WorkspaceRole,
};
use serde_json::json;
use tracing::info;

use super::{
    errors::{business_rule, ServiceError},
    escalation::RoleEscalationGuard,
    guard::PermissionGuard,
    ownership::{is_last_owner, OwnershipInvariant},
    realtime::{Audience, RealtimeNotifier},
    store::{Change, ChangeSet, Repository, VersionKey},
};

const DUPLICATE_MEMBER_RULE: &str = "duplicate_member";

pub(crate) async fn register_user<R: Repository>(repo: &R) -> Result<UserId, ServiceError> {
    let user = UserId::new();
    let mut changes = ChangeSet::new();
    changes.push(Change::RegisterUser(user));
    repo.commit(changes).await?;
    info!(event = "user.register", user_id = %user);
    Ok(user)
}

pub(crate) async fn create_workspace<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    name: WorkspaceName,
) -> Result<WorkspaceId, ServiceError> {
    let workspace = WorkspaceId::new();
    let mut changes = ChangeSet::new();
    changes
        .push(Change::CreateWorkspace { workspace, name })
        .push(Change::PutWorkspaceMember {
            workspace,
            user: actor,
            role: WorkspaceRole::Owner,
        });
    repo.commit(changes).await?;

    info!(event = "workspace.create", workspace_id = %workspace, user_id = %actor);
    notifier
        .notify(
            &[Audience::Workspace(workspace), Audience::User(actor)],
            "workspace_member_update",
            json!({ "workspace_id": workspace, "user_id": actor, "role": WorkspaceRole::Owner.as_str() }),
        )
        .await;
    Ok(workspace)
}

pub(crate) async fn create_board<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    workspace: WorkspaceId,
    name: BoardName,
) -> Result<BoardId, ServiceError> {
    // read before the membership check so a concurrent removal of the actor
    // fails this commit
    let version = members_version(repo, Scope::Workspace(workspace)).await?;
    PermissionGuard::new(repo)
        .ensure_workspace_member(workspace, actor)
        .await?;

    let board = BoardId::new();
    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(Scope::Workspace(workspace)), version)
        .push(Change::CreateBoard {
            board,
            workspace,
            name,
        })
        .push(Change::PutBoardMember {
            board,
            user: actor,
            role: BoardRole::Owner,
        });
    repo.commit(changes).await?;

    info!(event = "board.create", board_id = %board, workspace_id = %workspace, user_id = %actor);
    notifier
        .notify(
            &[Audience::Workspace(workspace)],
            "board_create",
            json!({ "workspace_id": workspace, "board_id": board, "created_by": actor }),
        )
        .await;
    Ok(board)
}

async fn members_version<R: Repository>(repo: &R, scope: Scope) -> Result<u64, ServiceError> {
    repo.version(VersionKey::Members(scope))
        .await?
        .ok_or(ServiceError::NotFound)
}

async fn ensure_user_exists<R: Repository>(repo: &R, user: UserId) -> Result<(), ServiceError> {
    if repo.user_exists(user).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound)
    }
}

fn current_role<R: Copy>(members: &[(UserId, R)], user: UserId) -> Option<R> {
    members
        .iter()
        .find(|(member, _)| *member == user)
        .map(|(_, role)| *role)
}

pub(crate) async fn add_workspace_member<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    workspace: WorkspaceId,
    user: UserId,
    role: WorkspaceRole,
) -> Result<(), ServiceError> {
    PermissionGuard::new(repo)
        .ensure_workspace_admin(workspace, actor)
        .await?;
    ensure_user_exists(repo, user).await?;
    RoleEscalationGuard::new(repo)
        .ensure_workspace_grant(workspace, actor, user, role)
        .await?;

    let scope = Scope::Workspace(workspace);
    let version = members_version(repo, scope).await?;
    let members = repo.workspace_members(workspace).await?;
    if current_role(&members, user).is_some() {
        return Err(business_rule(
            DUPLICATE_MEMBER_RULE,
            "user is already a member of this workspace",
        ));
    }

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::PutWorkspaceMember {
            workspace,
            user,
            role,
        });
    repo.commit(changes).await?;

    info!(event = "membership.add", scope = %scope, user_id = %user, role = role.as_str());
    notify_workspace_member(notifier, workspace, user, role).await;
    Ok(())
}

pub(crate) async fn update_workspace_member_role<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    workspace: WorkspaceId,
    target: UserId,
    role: WorkspaceRole,
) -> Result<(), ServiceError> {
    PermissionGuard::new(repo)
        .ensure_workspace_admin(workspace, actor)
        .await?;
    let scope = Scope::Workspace(workspace);
    let version = members_version(repo, scope).await?;
    let Some(previous) = current_role(&repo.workspace_members(workspace).await?, target) else {
        return Err(ServiceError::NotFound);
    };
    RoleEscalationGuard::new(repo)
        .ensure_workspace_grant(workspace, actor, target, role)
        .await?;
    OwnershipInvariant::new(repo)
        .ensure_demotable(scope, target, role.is_owner())
        .await?;

    // boards the target only saw through the workspace override
    let mut unseated = Vec::new();
    if previous.overrides_boards() && !role.overrides_boards() {
        for board in repo.workspace_boards(workspace).await? {
            if repo.board_role(board, target).await?.is_none() {
                unseated.push(Audience::Board(board));
            }
        }
    }

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::PutWorkspaceMember {
            workspace,
            user: target,
            role,
        });
    repo.commit(changes).await?;

    info!(event = "membership.update_role", scope = %scope, user_id = %target, role = role.as_str());
    notify_workspace_member(notifier, workspace, target, role).await;
    if !unseated.is_empty() {
        notifier.revoke(target, &unseated).await;
    }
    Ok(())
}

async fn notify_workspace_member<N: RealtimeNotifier>(
    notifier: &N,
    workspace: WorkspaceId,
    user: UserId,
    role: WorkspaceRole,
) {
    notifier
        .notify(
            &[Audience::Workspace(workspace), Audience::User(user)],
            "workspace_member_update",
            json!({ "workspace_id": workspace, "user_id": user, "role": role.as_str() }),
        )
        .await;
}

/// Removes `target` from the workspace together with their board seats and
/// assignments inside it.
pub(crate) async fn remove_workspace_member<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    workspace: WorkspaceId,
    target: UserId,
) -> Result<(), ServiceError> {
    let guard = PermissionGuard::new(repo);
    if actor == target {
        guard.ensure_workspace_member(workspace, actor).await?;
    } else {
        guard.ensure_workspace_admin(workspace, actor).await?;
        guard
            .ensure_can_modify_workspace_member_role(workspace, actor, target)
            .await?;
    }

    let scope = Scope::Workspace(workspace);
    let version = members_version(repo, scope).await?;
    if current_role(&repo.workspace_members(workspace).await?, target).is_none() {
        return Err(ServiceError::NotFound);
    }
    OwnershipInvariant::new(repo)
        .ensure_removable(scope, actor, target)
        .await?;

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::RemoveWorkspaceMember {
            workspace,
            user: target,
        });

    let mut revoked = vec![Audience::Workspace(workspace)];
    let mut boards_left = 0_usize;
    for board in repo.workspace_boards(workspace).await? {
        revoked.push(Audience::Board(board));
        let board_scope = Scope::Board(board);
        let board_version = members_version(repo, board_scope).await?;
        let members = repo.board_members(board).await?;
        if current_role(&members, target).is_none() {
            continue;
        }
        if is_last_owner(&members, target) {
            let reason = if actor == target {
                String::from(
                    "you are the last owner of a board in this workspace; transfer ownership before leaving",
                )
            } else {
                String::from("cannot remove the last owner of a board in this workspace")
            };
            return Err(business_rule("last_owner", reason));
        }
        changes
            .guard(VersionKey::Members(board_scope), board_version)
            .push(Change::RemoveBoardMember {
                board,
                user: target,
            });
        boards_left += 1;
    }

    let assignments = repo.user_assignments(workspace, target).await?;
    let unassigned = assignments.len();
    changes.extend(
        assignments
            .into_iter()
            .map(|item| Change::RemoveAssignee { item, user: target }),
    );
    repo.commit(changes).await?;

    info!(
        event = "membership.remove",
        scope = %scope,
        user_id = %target,
        boards_left,
        unassigned
    );
    notifier
        .notify(
            &[Audience::Workspace(workspace), Audience::User(target)],
            "workspace_member_remove",
            json!({ "workspace_id": workspace, "user_id": target }),
        )
        .await;
    notifier.revoke(target, &revoked).await;
    Ok(())
}

pub(crate) async fn add_board_member<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    board: BoardId,
    user: UserId,
    role: BoardRole,
) -> Result<(), ServiceError> {
    let access = PermissionGuard::new(repo)
        .ensure_board_editor(board, actor)
        .await?;
    ensure_user_exists(repo, user).await?;
    RoleEscalationGuard::new(repo)
        .ensure_board_grant(board, actor, user, role)
        .await?;
    if repo.workspace_role(access.workspace, user).await?.is_none() {
        return Err(business_rule(
            "board_member_outside_workspace",
            "user must be a member of the workspace before joining one of its boards",
        ));
    }

    let scope = Scope::Board(board);
    let version = members_version(repo, scope).await?;
    if current_role(&repo.board_members(board).await?, user).is_some() {
        return Err(business_rule(
            DUPLICATE_MEMBER_RULE,
            "user is already a member of this board",
        ));
    }

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::PutBoardMember { board, user, role });
    repo.commit(changes).await?;

    info!(event = "membership.add", scope = %scope, user_id = %user, role = role.as_str());
    notify_board_member(notifier, board, user, role).await;
    Ok(())
}

pub(crate) async fn update_board_member_role<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    board: BoardId,
    target: UserId,
    role: BoardRole,
) -> Result<(), ServiceError> {
    PermissionGuard::new(repo)
        .ensure_board_editor(board, actor)
        .await?;
    let scope = Scope::Board(board);
    let version = members_version(repo, scope).await?;
    if current_role(&repo.board_members(board).await?, target).is_none() {
        return Err(ServiceError::NotFound);
    }
    RoleEscalationGuard::new(repo)
        .ensure_board_grant(board, actor, target, role)
        .await?;
    OwnershipInvariant::new(repo)
        .ensure_demotable(scope, target, role.is_owner())
        .await?;

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::PutBoardMember {
            board,
            user: target,
            role,
        });
    repo.commit(changes).await?;

    info!(event = "membership.update_role", scope = %scope, user_id = %target, role = role.as_str());
    notify_board_member(notifier, board, target, role).await;
    Ok(())
}

async fn notify_board_member<N: RealtimeNotifier>(
    notifier: &N,
    board: BoardId,
    user: UserId,
    role: BoardRole,
) {
    notifier
        .notify(
            &[Audience::Board(board), Audience::User(user)],
            "board_member_update",
            json!({ "board_id": board, "user_id": user, "role": role.as_str() }),
        )
        .await;
}

pub(crate) async fn remove_board_member<R: Repository, N: RealtimeNotifier>(
    repo: &R,
    notifier: &N,
    actor: UserId,
    board: BoardId,
    target: UserId,
) -> Result<(), ServiceError> {
    let guard = PermissionGuard::new(repo);
    if actor == target {
        guard.ensure_board_viewer(board, actor).await?;
    } else {
        guard.ensure_board_editor(board, actor).await?;
        guard
            .ensure_can_modify_board_member_role(board, actor, target)
            .await?;
    }

    let scope = Scope::Board(board);
    let version = members_version(repo, scope).await?;
    if current_role(&repo.board_members(board).await?, target).is_none() {
        return Err(ServiceError::NotFound);
    }
    OwnershipInvariant::new(repo)
        .ensure_removable(scope, actor, target)
        .await?;
    let still_sees_board = guard.board_access(board, target).await?.overrides();

    let mut changes = ChangeSet::new();
    changes
        .guard(VersionKey::Members(scope), version)
        .push(Change::RemoveBoardMember {
            board,
            user: target,
        });
    repo.commit(changes).await?;

    info!(event = "membership.remove", scope = %scope, user_id = %target);
    notifier
        .notify(
            &[Audience::Board(board), Audience::User(target)],
            "board_member_remove",
            json!({ "board_id": board, "user_id": target }),
        )
        .await;
    if !still_sees_board {
        notifier.revoke(target, &[Audience::Board(board)]).await;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkspaceView {
    pub(crate) name: String,
    pub(crate) boards: Vec<BoardId>,
    pub(crate) members: Vec<(UserId, WorkspaceRole)>,
}

pub(crate) async fn describe_workspace<R: Repository>(
    repo: &R,
    actor: UserId,
    workspace: WorkspaceId,
) -> Result<WorkspaceView, ServiceError> {
    PermissionGuard::new(repo)
        .ensure_workspace_member(workspace, actor)
        .await?;
    Ok(WorkspaceView {
        name: repo
            .workspace_name(workspace)
            .await?
            .ok_or(ServiceError::NotFound)?,
        boards: repo.workspace_boards(workspace).await?,
        members: repo.workspace_members(workspace).await?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BoardView {
    pub(crate) name: String,
    pub(crate) workspace: WorkspaceId,
    pub(crate) members: Vec<(UserId, BoardRole)>,
    pub(crate) lists: Vec<Slot<Item>>,
}

pub(crate) async fn describe_board<R: Repository>(
    repo: &R,
    actor: UserId,
    board: BoardId,
) -> Result<BoardView, ServiceError> {
    let access = PermissionGuard::new(repo)
        .ensure_board_viewer(board, actor)
        .await?;
    let lists = repo
        .load_siblings(Container::Board(board))
        .await?
        .ok_or(ServiceError::NotFound)?
        .slots;
    Ok(BoardView {
        name: repo.board_name(board).await?.ok_or(ServiceError::NotFound)?,
        workspace: access.workspace,
        members: repo.board_members(board).await?,
        lists,
    })
}

//! Authorization checks. Every `ensure_*` either returns what it resolved on
//! the way or fails with `NotFound` (missing scope) or `Forbidden`.
//!
//! Board checks are layered: workspace Admin/Owner always pass, everybody
//! else must be a workspace member first and then hold the board role.
//! Cards add one more tier below that for card assignees.

use corkboard_core::{
    can_assign_role, can_modify_member, meets_minimum, BoardId, BoardRole, CardId, Item, UserId,
    WorkspaceId, WorkspaceRole,
};

use super::{
    directory::RoleDirectory, errors::ServiceError, hierarchy::enclosing_board,
    metrics::record_permission_denied, store::Repository,
};

/// Roles an actor holds around one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoardAccess {
    pub(crate) workspace: WorkspaceId,
    pub(crate) workspace_role: Option<WorkspaceRole>,
    pub(crate) board_role: Option<BoardRole>,
}

impl BoardAccess {
    pub(crate) fn overrides(&self) -> bool {
        self.workspace_role
            .is_some_and(WorkspaceRole::overrides_boards)
    }
}

/// Where an authorized card lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CardAccess {
    pub(crate) board: BoardId,
    pub(crate) workspace: WorkspaceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CardAction {
    View,
    Comment,
    Edit,
    Assign,
    Delete,
}

impl CardAction {
    const fn board_minimum(self) -> BoardRole {
        match self {
            Self::View | Self::Comment => BoardRole::Viewer,
            Self::Edit | Self::Assign | Self::Delete => BoardRole::Editor,
        }
    }

    /// Assignees may look at, discuss and edit their card, nothing more.
    const fn open_to_assignees(self) -> bool {
        matches!(self, Self::View | Self::Comment | Self::Edit)
    }

    const fn denial_reason(self) -> &'static str {
        match self {
            Self::View => "card_view",
            Self::Comment => "card_comment",
            Self::Edit => "card_edit",
            Self::Assign => "card_assign",
            Self::Delete => "card_delete",
        }
    }
}

pub(crate) struct PermissionGuard<'a, R> {
    repo: &'a R,
    directory: RoleDirectory<'a, R>,
}

impl<'a, R: Repository> PermissionGuard<'a, R> {
    pub(crate) const fn new(repo: &'a R) -> Self {
        Self {
            repo,
            directory: RoleDirectory::new(repo),
        }
    }

    pub(crate) async fn ensure_workspace(
        &self,
        workspace: WorkspaceId,
        user: UserId,
        minimum: WorkspaceRole,
    ) -> Result<WorkspaceRole, ServiceError> {
        if !self.repo.workspace_exists(workspace).await? {
            return Err(ServiceError::NotFound);
        }
        match self.directory.workspace_role(workspace, user).await? {
            Some(role) if meets_minimum(Some(role), minimum) => Ok(role),
            Some(_) => Err(deny("workspace", "insufficient_role", user)),
            None => Err(deny("workspace", "not_workspace_member", user)),
        }
    }

    pub(crate) async fn ensure_workspace_member(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<WorkspaceRole, ServiceError> {
        self.ensure_workspace(workspace, user, WorkspaceRole::Member)
            .await
    }

    pub(crate) async fn ensure_workspace_admin(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<WorkspaceRole, ServiceError> {
        self.ensure_workspace(workspace, user, WorkspaceRole::Admin)
            .await
    }

    pub(crate) async fn ensure_workspace_owner(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<WorkspaceRole, ServiceError> {
        self.ensure_workspace(workspace, user, WorkspaceRole::Owner)
            .await
    }

    pub(crate) async fn board_access(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<BoardAccess, ServiceError> {
        let workspace = self
            .repo
            .board_workspace(board)
            .await?
            .ok_or(ServiceError::NotFound)?;
        Ok(BoardAccess {
            workspace,
            workspace_role: self.directory.workspace_role(workspace, user).await?,
            board_role: self.directory.board_role(board, user).await?,
        })
    }

    pub(crate) async fn ensure_board(
        &self,
        board: BoardId,
        user: UserId,
        minimum: BoardRole,
    ) -> Result<BoardAccess, ServiceError> {
        let access = self.board_access(board, user).await?;
        if access.overrides() {
            return Ok(access);
        }
        if access.workspace_role.is_none() {
            return Err(deny("board", "not_workspace_member", user));
        }
        if meets_minimum(access.board_role, minimum) {
            return Ok(access);
        }
        let reason = if access.board_role.is_none() {
            "not_board_member"
        } else {
            "insufficient_role"
        };
        Err(deny("board", reason, user))
    }

    pub(crate) async fn ensure_board_viewer(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<BoardAccess, ServiceError> {
        self.ensure_board(board, user, BoardRole::Viewer).await
    }

    pub(crate) async fn ensure_board_editor(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<BoardAccess, ServiceError> {
        self.ensure_board(board, user, BoardRole::Editor).await
    }

    pub(crate) async fn ensure_board_owner(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<BoardAccess, ServiceError> {
        self.ensure_board(board, user, BoardRole::Owner).await
    }

    pub(crate) async fn ensure_card(
        &self,
        card: CardId,
        user: UserId,
        action: CardAction,
    ) -> Result<CardAccess, ServiceError> {
        let placement = self
            .repo
            .locate(Item::Card(card))
            .await?
            .ok_or(ServiceError::NotFound)?;
        let board = enclosing_board(self.repo, placement.parent).await?;
        let access = self.board_access(board, user).await?;
        let card_access = CardAccess {
            board,
            workspace: access.workspace,
        };

        if access.overrides()
            || (access.workspace_role.is_some()
                && meets_minimum(access.board_role, action.board_minimum()))
        {
            return Ok(card_access);
        }
        if action.open_to_assignees()
            && self
                .repo
                .assignees(&[Item::Card(card)])
                .await?
                .iter()
                .any(|(_, assignee)| *assignee == user)
        {
            return Ok(card_access);
        }
        Err(deny("card", action.denial_reason(), user))
    }

    pub(crate) async fn ensure_card_view(
        &self,
        card: CardId,
        user: UserId,
    ) -> Result<CardAccess, ServiceError> {
        self.ensure_card(card, user, CardAction::View).await
    }

    pub(crate) async fn ensure_card_comment(
        &self,
        card: CardId,
        user: UserId,
    ) -> Result<CardAccess, ServiceError> {
        self.ensure_card(card, user, CardAction::Comment).await
    }

    pub(crate) async fn ensure_card_edit(
        &self,
        card: CardId,
        user: UserId,
    ) -> Result<CardAccess, ServiceError> {
        self.ensure_card(card, user, CardAction::Edit).await
    }

    pub(crate) async fn ensure_card_assign(
        &self,
        card: CardId,
        user: UserId,
    ) -> Result<CardAccess, ServiceError> {
        self.ensure_card(card, user, CardAction::Assign).await
    }

    pub(crate) async fn ensure_card_delete(
        &self,
        card: CardId,
        user: UserId,
    ) -> Result<CardAccess, ServiceError> {
        self.ensure_card(card, user, CardAction::Delete).await
    }

    /// Workspace ranks always apply, even to Admins and Owners.
    pub(crate) async fn ensure_can_assign_workspace_role(
        &self,
        workspace: WorkspaceId,
        actor: UserId,
        new_role: WorkspaceRole,
    ) -> Result<(), ServiceError> {
        let actor_role = self.directory.workspace_role(workspace, actor).await?;
        if can_assign_role(actor_role, new_role) {
            return Ok(());
        }
        Err(deny("workspace", "role_above_actor", actor))
    }

    pub(crate) async fn ensure_can_modify_workspace_member_role(
        &self,
        workspace: WorkspaceId,
        actor: UserId,
        target: UserId,
    ) -> Result<(), ServiceError> {
        let actor_role = self.directory.workspace_role(workspace, actor).await?;
        let target_role = self.directory.workspace_role(workspace, target).await?;
        if can_modify_member(actor_role, target_role) {
            return Ok(());
        }
        Err(deny("workspace", "target_above_actor", actor))
    }

    pub(crate) async fn ensure_can_assign_board_role(
        &self,
        board: BoardId,
        actor: UserId,
        new_role: BoardRole,
    ) -> Result<(), ServiceError> {
        let access = self.board_access(board, actor).await?;
        if access.overrides() || can_assign_role(access.board_role, new_role) {
            return Ok(());
        }
        Err(deny("board", "role_above_actor", actor))
    }

    pub(crate) async fn ensure_can_modify_board_member_role(
        &self,
        board: BoardId,
        actor: UserId,
        target: UserId,
    ) -> Result<(), ServiceError> {
        let access = self.board_access(board, actor).await?;
        if access.overrides() {
            return Ok(());
        }
        let target_role = self.directory.board_role(board, target).await?;
        if can_modify_member(access.board_role, target_role) {
            return Ok(());
        }
        Err(deny("board", "target_above_actor", actor))
    }
}

fn deny(scope: &'static str, reason: &'static str, user: UserId) -> ServiceError {
    record_permission_denied(scope, reason);
    tracing::warn!(event = "permission.denied", scope, reason, user_id = %user);
    ServiceError::Forbidden
}

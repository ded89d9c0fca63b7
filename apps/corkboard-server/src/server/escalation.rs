use corkboard_core::{BoardId, BoardRole, UserId, WorkspaceId, WorkspaceRole};

use super::{errors::ServiceError, guard::PermissionGuard, store::Repository};

/// Runs on every path that writes a role value, including member creation:
/// the actor must be allowed to touch the target and to hand out the role.
pub(crate) struct RoleEscalationGuard<'a, R> {
    guard: PermissionGuard<'a, R>,
}

impl<'a, R: Repository> RoleEscalationGuard<'a, R> {
    pub(crate) const fn new(repo: &'a R) -> Self {
        Self {
            guard: PermissionGuard::new(repo),
        }
    }

    pub(crate) async fn ensure_workspace_grant(
        &self,
        workspace: WorkspaceId,
        actor: UserId,
        target: UserId,
        new_role: WorkspaceRole,
    ) -> Result<(), ServiceError> {
        self.guard
            .ensure_can_modify_workspace_member_role(workspace, actor, target)
            .await?;
        self.guard
            .ensure_can_assign_workspace_role(workspace, actor, new_role)
            .await
    }

    pub(crate) async fn ensure_board_grant(
        &self,
        board: BoardId,
        actor: UserId,
        target: UserId,
        new_role: BoardRole,
    ) -> Result<(), ServiceError> {
        self.guard
            .ensure_can_modify_board_member_role(board, actor, target)
            .await?;
        self.guard
            .ensure_can_assign_board_role(board, actor, new_role)
            .await
    }
}

#[cfg(test)]
mod tests {
    use corkboard_core::{BoardRole, WorkspaceRole};

    use super::RoleEscalationGuard;
    use crate::server::{errors::ServiceError, test_support::Fixture};

    #[tokio::test]
    async fn editor_cannot_raise_anyone_above_editor() {
        let fixture = Fixture::new().await;
        let editor = fixture.board_member(BoardRole::Editor).await;
        let viewer = fixture.board_member(BoardRole::Viewer).await;
        let escalation = RoleEscalationGuard::new(&fixture.store);

        assert!(escalation
            .ensure_board_grant(fixture.board, editor, viewer, BoardRole::Editor)
            .await
            .is_ok());
        assert_eq!(
            escalation
                .ensure_board_grant(fixture.board, editor, viewer, BoardRole::Owner)
                .await
                .unwrap_err(),
            ServiceError::Forbidden
        );
        // self promotion is the same check
        assert_eq!(
            escalation
                .ensure_board_grant(fixture.board, editor, editor, BoardRole::Owner)
                .await
                .unwrap_err(),
            ServiceError::Forbidden
        );
    }

    #[tokio::test]
    async fn admin_cannot_touch_owner_or_grant_owner() {
        let fixture = Fixture::new().await;
        let admin = fixture.workspace_member(WorkspaceRole::Admin).await;
        let member = fixture.workspace_member(WorkspaceRole::Member).await;
        let escalation = RoleEscalationGuard::new(&fixture.store);

        assert!(escalation
            .ensure_workspace_grant(fixture.workspace, admin, member, WorkspaceRole::Admin)
            .await
            .is_ok());
        assert_eq!(
            escalation
                .ensure_workspace_grant(fixture.workspace, admin, member, WorkspaceRole::Owner)
                .await
                .unwrap_err(),
            ServiceError::Forbidden
        );
        assert_eq!(
            escalation
                .ensure_workspace_grant(
                    fixture.workspace,
                    admin,
                    fixture.owner,
                    WorkspaceRole::Member
                )
                .await
                .unwrap_err(),
            ServiceError::Forbidden
        );
    }
}

use corkboard_core::{BoardId, BoardRole, UserId, WorkspaceId, WorkspaceRole};

use super::{errors::ServiceError, store::Repository};

/// Membership lookups. `Ok(None)` means "not a member", which callers must
/// keep apart from the lowest role.
pub(crate) struct RoleDirectory<'a, R> {
    repo: &'a R,
}

impl<'a, R: Repository> RoleDirectory<'a, R> {
    pub(crate) const fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    pub(crate) async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError> {
        self.repo.workspace_role(workspace, user).await
    }

    pub(crate) async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError> {
        self.repo.board_role(board, user).await
    }
}

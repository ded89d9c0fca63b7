use corkboard_core::{Scope, ScopeRole, UserId};

use super::{
    errors::{business_rule, ServiceError},
    store::Repository,
};

const LAST_OWNER_RULE: &str = "last_owner";

/// `true` iff `user` holds Owner and nobody else does.
pub(crate) fn is_last_owner<R: ScopeRole>(members: &[(UserId, R)], user: UserId) -> bool {
    let holds_owner = members
        .iter()
        .any(|(member, role)| *member == user && role.is_owner());
    holds_owner && members.iter().filter(|(_, role)| role.is_owner()).count() == 1
}

/// Keeps at least one Owner on every workspace and board.
pub(crate) struct OwnershipInvariant<'a, R> {
    repo: &'a R,
}

impl<'a, R: Repository> OwnershipInvariant<'a, R> {
    pub(crate) const fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    pub(crate) async fn is_last_owner(&self, scope: Scope, user: UserId) -> Result<bool, ServiceError> {
        Ok(match scope {
            Scope::Workspace(workspace) => {
                is_last_owner(&self.repo.workspace_members(workspace).await?, user)
            }
            Scope::Board(board) => is_last_owner(&self.repo.board_members(board).await?, user),
        })
    }

    /// Rejects removing the sole Owner. The sole Owner leaving on their own
    /// gets a different message from someone else removing them.
    pub(crate) async fn ensure_removable(
        &self,
        scope: Scope,
        actor: UserId,
        target: UserId,
    ) -> Result<(), ServiceError> {
        if !self.is_last_owner(scope, target).await? {
            return Ok(());
        }
        let noun = scope_noun(scope);
        let reason = if actor == target {
            format!("you are the last owner of this {noun}; transfer ownership before leaving")
        } else {
            format!("cannot remove the last owner of this {noun}")
        };
        tracing::info!(event = "membership.remove", outcome = "last_owner", scope = %scope);
        Err(business_rule(LAST_OWNER_RULE, reason))
    }

    /// Rejects taking Owner away from the sole Owner.
    pub(crate) async fn ensure_demotable(
        &self,
        scope: Scope,
        target: UserId,
        keeps_owner: bool,
    ) -> Result<(), ServiceError> {
        if keeps_owner || !self.is_last_owner(scope, target).await? {
            return Ok(());
        }
        tracing::info!(event = "membership.update_role", outcome = "last_owner", scope = %scope);
        Err(business_rule(
            LAST_OWNER_RULE,
            format!(
                "cannot demote the last owner of this {}; promote another owner first",
                scope_noun(scope)
            ),
        ))
    }
}

const fn scope_noun(scope: Scope) -> &'static str {
    match scope {
        Scope::Workspace(_) => "workspace",
        Scope::Board(_) => "board",
    }
}

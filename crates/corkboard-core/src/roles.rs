use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Role enumeration attached to one kind of scope, totally ordered by rank.
pub trait ScopeRole: Copy + Eq + core::fmt::Debug {
    /// The role that must never disappear from a scope.
    const OWNER: Self;

    fn rank(self) -> u8;

    fn is_owner(self) -> bool {
        self == Self::OWNER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Member,
    Admin,
    Owner,
}

impl WorkspaceRole {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Member => 1,
            Self::Admin => 2,
            Self::Owner => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Admins and owners act on every board of their workspace regardless of
    /// board membership.
    #[must_use]
    pub const fn overrides_boards(self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }
}

impl ScopeRole for WorkspaceRole {
    const OWNER: Self = Self::Owner;

    fn rank(self) -> u8 {
        WorkspaceRole::rank(self)
    }
}

impl PartialOrd for WorkspaceRole {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkspaceRole {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl TryFrom<String> for WorkspaceRole {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            _ => Err(DomainError::InvalidRole),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardRole {
    Viewer,
    Editor,
    Owner,
}

impl BoardRole {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Editor => 2,
            Self::Owner => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }
}

impl ScopeRole for BoardRole {
    const OWNER: Self = Self::Owner;

    fn rank(self) -> u8 {
        BoardRole::rank(self)
    }
}

impl PartialOrd for BoardRole {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoardRole {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl TryFrom<String> for BoardRole {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "owner" => Ok(Self::Owner),
            _ => Err(DomainError::InvalidRole),
        }
    }
}

/// `true` when a membership exists and its rank reaches `minimum`.
#[must_use]
pub fn meets_minimum<R: ScopeRole>(actual: Option<R>, minimum: R) -> bool {
    actual.is_some_and(|role| role.rank() >= minimum.rank())
}

/// An actor may hand out any role up to and including their own rank.
#[must_use]
pub fn can_assign_role<R: ScopeRole>(actor: Option<R>, new_role: R) -> bool {
    actor.is_some_and(|role| new_role.rank() <= role.rank())
}

/// An actor may touch a member whose current rank does not exceed their own.
/// Targets without a role at the scope are always touchable.
#[must_use]
pub fn can_modify_member<R: ScopeRole>(actor: Option<R>, target_current: Option<R>) -> bool {
    let Some(target) = target_current else {
        return true;
    };
    actor.is_some_and(|role| target.rank() <= role.rank())
}

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use ulid::Ulid;

mod ordering;
mod roles;
mod tree;

pub use ordering::{
    append_position, insert_and_repack, is_dense, remove_and_repack, reorder_within_container,
    Slot,
};
pub use roles::{
    can_assign_role, can_modify_member, meets_minimum, BoardRole, ScopeRole, WorkspaceRole,
};
pub use tree::{Container, Item, ItemKind, Scope};

/// Returns the project code name.
#[must_use]
pub const fn project_name() -> &'static str {
    "corkboard"
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("name is invalid")]
    InvalidName,
    #[error("title is invalid")]
    InvalidTitle,
    #[error("description is invalid")]
    InvalidDescription,
    #[error("comment body is invalid")]
    InvalidComment,
    #[error("identifier is invalid")]
    InvalidId,
    #[error("role is invalid")]
    InvalidRole,
    #[error("item kind is invalid")]
    InvalidItemKind,
}

macro_rules! ulid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            #[must_use]
            pub const fn from_ulid(value: Ulid) -> Self {
                Self(value)
            }

            #[must_use]
            pub const fn as_ulid(self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(value)
                    .map(Self)
                    .map_err(|_| DomainError::InvalidId)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ulid_identifier!(UserId);
ulid_identifier!(WorkspaceId);
ulid_identifier!(BoardId);
ulid_identifier!(ListId);
ulid_identifier!(CardId);
ulid_identifier!(TaskId);
ulid_identifier!(
    /// Identifier of a checklist entry nested under a task.
    SubTaskId
);
ulid_identifier!(CommentId);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceName(String);

impl WorkspaceName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkspaceName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardName(String);

impl BoardName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BoardName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

/// Title shared by lists, cards, tasks and subtasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemTitle(String);

impl ItemTitle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemTitle {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_title(&value)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardDescription(String);

impl CardDescription {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CardDescription {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_free_text(&value, 0, 4_096).map_err(|()| DomainError::InvalidDescription)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommentBody(String);

impl CommentBody {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommentBody {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_free_text(&value, 1, 2_048).map_err(|()| DomainError::InvalidComment)?;
        Ok(Self(value))
    }
}

fn validate_name(value: &str, min: usize, max: usize) -> Result<(), DomainError> {
    if !(min..=max).contains(&value.len()) || value.trim().is_empty() {
        return Err(DomainError::InvalidName);
    }

    if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Ok(());
    }

    Err(DomainError::InvalidName)
}

fn validate_title(value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() || value.chars().count() > 128 {
        return Err(DomainError::InvalidTitle);
    }
    if value.chars().any(char::is_control) {
        return Err(DomainError::InvalidTitle);
    }
    Ok(())
}

fn validate_free_text(value: &str, min: usize, max: usize) -> Result<(), ()> {
    if !(min..=max).contains(&value.len()) {
        return Err(());
    }
    if value.contains('\0') {
        return Err(());
    }
    Ok(())
}

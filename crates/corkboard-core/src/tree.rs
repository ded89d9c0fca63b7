use serde::{Deserialize, Serialize};

use crate::{BoardId, CardId, DomainError, ListId, SubTaskId, TaskId, WorkspaceId};

/// Level of an ordered child in the containment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "list")]
    List,
    #[serde(rename = "card")]
    Card,
    #[serde(rename = "task")]
    Task,
    #[serde(rename = "subtask")]
    SubTask,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Card => "card",
            Self::Task => "task",
            Self::SubTask => "subtask",
        }
    }

    /// Cards, tasks and subtasks can be archived and restored; lists cannot.
    #[must_use]
    pub const fn supports_archive(self) -> bool {
        !matches!(self, Self::List)
    }
}

impl TryFrom<String> for ItemKind {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "list" => Ok(Self::List),
            "card" => Ok(Self::Card),
            "task" => Ok(Self::Task),
            "subtask" => Ok(Self::SubTask),
            _ => Err(DomainError::InvalidItemKind),
        }
    }
}

/// An ordered child somewhere below a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Item {
    #[serde(rename = "list")]
    List(ListId),
    #[serde(rename = "card")]
    Card(CardId),
    #[serde(rename = "task")]
    Task(TaskId),
    #[serde(rename = "subtask")]
    SubTask(SubTaskId),
}

impl Item {
    /// Parses an item identifier of the given kind.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidId`] when `id` is not a ULID.
    pub fn parse(kind: ItemKind, id: &str) -> Result<Self, DomainError> {
        Ok(match kind {
            ItemKind::List => Self::List(id.parse()?),
            ItemKind::Card => Self::Card(id.parse()?),
            ItemKind::Task => Self::Task(id.parse()?),
            ItemKind::SubTask => Self::SubTask(id.parse()?),
        })
    }

    #[must_use]
    pub const fn kind(self) -> ItemKind {
        match self {
            Self::List(_) => ItemKind::List,
            Self::Card(_) => ItemKind::Card,
            Self::Task(_) => ItemKind::Task,
            Self::SubTask(_) => ItemKind::SubTask,
        }
    }

    /// The container this item opens for its own children, if it has any.
    #[must_use]
    pub const fn as_container(self) -> Option<Container> {
        match self {
            Self::List(id) => Some(Container::List(id)),
            Self::Card(id) => Some(Container::Card(id)),
            Self::Task(id) => Some(Container::Task(id)),
            Self::SubTask(_) => None,
        }
    }

    #[must_use]
    pub fn id_string(self) -> String {
        match self {
            Self::List(id) => id.to_string(),
            Self::Card(id) => id.to_string(),
            Self::Task(id) => id.to_string(),
            Self::SubTask(id) => id.to_string(),
        }
    }
}

impl core::fmt::Display for Item {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id_string())
    }
}

/// A node owning an ordered collection of the next level down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Container {
    #[serde(rename = "board")]
    Board(BoardId),
    #[serde(rename = "list")]
    List(ListId),
    #[serde(rename = "card")]
    Card(CardId),
    #[serde(rename = "task")]
    Task(TaskId),
}

impl Container {
    /// Parses the identifier of a container able to hold children of `child`.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidId`] when `id` is not a ULID.
    pub fn parse_for_child(child: ItemKind, id: &str) -> Result<Self, DomainError> {
        Ok(match child {
            ItemKind::List => Self::Board(id.parse()?),
            ItemKind::Card => Self::List(id.parse()?),
            ItemKind::Task => Self::Card(id.parse()?),
            ItemKind::SubTask => Self::Task(id.parse()?),
        })
    }

    #[must_use]
    pub const fn child_kind(self) -> ItemKind {
        match self {
            Self::Board(_) => ItemKind::List,
            Self::List(_) => ItemKind::Card,
            Self::Card(_) => ItemKind::Task,
            Self::Task(_) => ItemKind::SubTask,
        }
    }

    /// Boards are scopes, not items; every other container is itself an item.
    #[must_use]
    pub const fn as_item(self) -> Option<Item> {
        match self {
            Self::Board(_) => None,
            Self::List(id) => Some(Item::List(id)),
            Self::Card(id) => Some(Item::Card(id)),
            Self::Task(id) => Some(Item::Task(id)),
        }
    }

    #[must_use]
    pub const fn kind_str(self) -> &'static str {
        match self {
            Self::Board(_) => "board",
            Self::List(_) => "list",
            Self::Card(_) => "card",
            Self::Task(_) => "task",
        }
    }

    #[must_use]
    pub fn id_string(self) -> String {
        match self {
            Self::Board(id) => id.to_string(),
            Self::List(id) => id.to_string(),
            Self::Card(id) => id.to_string(),
            Self::Task(id) => id.to_string(),
        }
    }
}

impl core::fmt::Display for Container {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id_string())
    }
}

/// A node carrying its own membership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Workspace(WorkspaceId),
    Board(BoardId),
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Workspace(id) => write!(f, "workspace:{id}"),
            Self::Board(id) => write!(f, "board:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Container, Item, ItemKind};
    use crate::{CardId, DomainError, ListId};

    #[test]
    fn containers_and_items_line_up_level_by_level() {
        let list = ListId::new();
        let item = Item::List(list);
        let container = item.as_container().unwrap();
        assert_eq!(container, Container::List(list));
        assert_eq!(container.child_kind(), ItemKind::Card);
        assert_eq!(container.as_item(), Some(item));
        assert_eq!(Item::SubTask(crate::SubTaskId::new()).as_container(), None);
    }

    #[test]
    fn parse_for_child_selects_the_parent_level() {
        let card = CardId::new();
        let parsed = Container::parse_for_child(ItemKind::Task, &card.to_string()).unwrap();
        assert_eq!(parsed, Container::Card(card));
        assert_eq!(
            Container::parse_for_child(ItemKind::Card, "nope").unwrap_err(),
            DomainError::InvalidId
        );
    }

    #[test]
    fn item_kind_parses_wire_names() {
        assert_eq!(
            ItemKind::try_from(String::from("subtask")).unwrap(),
            ItemKind::SubTask
        );
        assert_eq!(
            ItemKind::try_from(String::from("board")).unwrap_err(),
            DomainError::InvalidItemKind
        );
        assert!(!ItemKind::List.supports_archive());
        assert!(ItemKind::Card.supports_archive());
    }

    #[test]
    fn display_is_kind_prefixed() {
        let card = CardId::new();
        assert_eq!(Item::Card(card).to_string(), format!("card:{card}"));
    }
}

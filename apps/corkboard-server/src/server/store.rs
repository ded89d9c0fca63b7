//! Repository port. Services never touch a backend directly; they read
//! snapshots through [`Repository`] and write through a single
//! [`Repository::commit`] per command.

pub(crate) mod memory;
pub(crate) mod postgres;

use corkboard_core::{
    BoardId, BoardName, BoardRole, CardDescription, CardId, CommentBody, CommentId, Container,
    Item, ItemTitle, Scope, Slot, UserId, WorkspaceId, WorkspaceName, WorkspaceRole,
};

use super::errors::ServiceError;

/// Optimistic concurrency counter a commit can be guarded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum VersionKey {
    /// Bumped whenever the membership table of a scope is written. The
    /// workspace key is also bumped when a board is created in it.
    Members(Scope),
    /// Bumped whenever the ordered children of a container are written.
    Children(Container),
}

/// Where an item currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub(crate) parent: Container,
    pub(crate) archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CardDetails {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommentView {
    pub(crate) comment: CommentId,
    pub(crate) author: UserId,
    pub(crate) body: String,
    pub(crate) created_at_unix: i64,
}

/// Live children of one container, ordered by position then insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Siblings {
    pub(crate) container: Container,
    pub(crate) version: u64,
    pub(crate) slots: Vec<Slot<Item>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Change {
    RegisterUser(UserId),
    CreateWorkspace {
        workspace: WorkspaceId,
        name: WorkspaceName,
    },
    CreateBoard {
        board: BoardId,
        workspace: WorkspaceId,
        name: BoardName,
    },
    PutWorkspaceMember {
        workspace: WorkspaceId,
        user: UserId,
        role: WorkspaceRole,
    },
    RemoveWorkspaceMember {
        workspace: WorkspaceId,
        user: UserId,
    },
    PutBoardMember {
        board: BoardId,
        user: UserId,
        role: BoardRole,
    },
    RemoveBoardMember {
        board: BoardId,
        user: UserId,
    },
    InsertItem {
        item: Item,
        parent: Container,
        position: u32,
        title: ItemTitle,
    },
    SetPosition {
        item: Item,
        position: u32,
    },
    Reparent {
        item: Item,
        parent: Container,
        position: u32,
    },
    SetArchived {
        item: Item,
        archived: bool,
        position: u32,
    },
    /// Removes one item together with its assignees and comments. Callers
    /// emit one change per subtree node, deepest first.
    DeleteItem(Item),
    AddAssignee {
        item: Item,
        user: UserId,
    },
    RemoveAssignee {
        item: Item,
        user: UserId,
    },
    UpdateCard {
        card: CardId,
        title: Option<ItemTitle>,
        description: Option<CardDescription>,
    },
    AddComment {
        comment: CommentId,
        card: CardId,
        author: UserId,
        body: CommentBody,
        created_at_unix: i64,
    },
}

/// Version guards plus the ordered writes of one command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ChangeSet {
    pub(crate) guards: Vec<(VersionKey, u64)>,
    pub(crate) changes: Vec<Change>,
}

impl ChangeSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to still be at `version` when the commit lands. Guarding
    /// the same key twice keeps the first observation.
    pub(crate) fn guard(&mut self, key: VersionKey, version: u64) -> &mut Self {
        if !self.guards.iter().any(|(existing, _)| *existing == key) {
            self.guards.push((key, version));
        }
        self
    }

    pub(crate) fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub(crate) fn extend(&mut self, changes: impl IntoIterator<Item = Change>) -> &mut Self {
        self.changes.extend(changes);
        self
    }

    pub(crate) fn reposition(&mut self, slots: &[Slot<Item>]) -> &mut Self {
        self.extend(slots.iter().map(|slot| Change::SetPosition {
            item: slot.id,
            position: slot.position,
        }))
    }
}

pub(crate) trait Repository {
    async fn user_exists(&self, user: UserId) -> Result<bool, ServiceError>;

    async fn workspace_exists(&self, workspace: WorkspaceId) -> Result<bool, ServiceError>;

    async fn workspace_name(&self, workspace: WorkspaceId) -> Result<Option<String>, ServiceError>;

    async fn board_workspace(&self, board: BoardId) -> Result<Option<WorkspaceId>, ServiceError>;

    async fn board_name(&self, board: BoardId) -> Result<Option<String>, ServiceError>;

    async fn workspace_boards(&self, workspace: WorkspaceId) -> Result<Vec<BoardId>, ServiceError>;

    async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError>;

    async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError>;

    async fn workspace_members(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(UserId, WorkspaceRole)>, ServiceError>;

    async fn board_members(&self, board: BoardId)
        -> Result<Vec<(UserId, BoardRole)>, ServiceError>;

    /// `None` when the scope or container behind `key` does not exist.
    async fn version(&self, key: VersionKey) -> Result<Option<u64>, ServiceError>;

    async fn locate(&self, item: Item) -> Result<Option<Placement>, ServiceError>;

    /// `None` when the container is missing or archived. Archived children
    /// are left out of the snapshot.
    async fn load_siblings(&self, container: Container) -> Result<Option<Siblings>, ServiceError>;

    /// Every direct child, archived ones included.
    async fn children(&self, container: Container) -> Result<Vec<Item>, ServiceError>;

    async fn assignees(&self, items: &[Item]) -> Result<Vec<(Item, UserId)>, ServiceError>;

    /// Items below any board of `workspace` that `user` is assigned to.
    async fn user_assignments(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Vec<Item>, ServiceError>;

    async fn card_details(&self, card: CardId) -> Result<Option<CardDetails>, ServiceError>;

    /// Comments on `card`, oldest first.
    async fn comments(&self, card: CardId) -> Result<Vec<CommentView>, ServiceError>;

    /// Applies `changes` atomically. Fails with [`ServiceError::Conflict`] and
    /// writes nothing when any guard no longer matches; otherwise bumps every
    /// guarded version by one.
    async fn commit(&self, changes: ChangeSet) -> Result<(), ServiceError>;
}

/// Backend selected at startup.
#[derive(Clone)]
pub(crate) enum Store {
    Memory(memory::InMemoryStore),
    Postgres(postgres::PgStore),
}

impl Repository for Store {
    async fn user_exists(&self, user: UserId) -> Result<bool, ServiceError> {
        match self {
            Self::Memory(store) => store.user_exists(user).await,
            Self::Postgres(store) => store.user_exists(user).await,
        }
    }

    async fn workspace_exists(&self, workspace: WorkspaceId) -> Result<bool, ServiceError> {
        match self {
            Self::Memory(store) => store.workspace_exists(workspace).await,
            Self::Postgres(store) => store.workspace_exists(workspace).await,
        }
    }

    async fn workspace_name(&self, workspace: WorkspaceId) -> Result<Option<String>, ServiceError> {
        match self {
            Self::Memory(store) => store.workspace_name(workspace).await,
            Self::Postgres(store) => store.workspace_name(workspace).await,
        }
    }

    async fn board_name(&self, board: BoardId) -> Result<Option<String>, ServiceError> {
        match self {
            Self::Memory(store) => store.board_name(board).await,
            Self::Postgres(store) => store.board_name(board).await,
        }
    }

    async fn board_workspace(&self, board: BoardId) -> Result<Option<WorkspaceId>, ServiceError> {
        match self {
            Self::Memory(store) => store.board_workspace(board).await,
            Self::Postgres(store) => store.board_workspace(board).await,
        }
    }

    async fn workspace_boards(&self, workspace: WorkspaceId) -> Result<Vec<BoardId>, ServiceError> {
        match self {
            Self::Memory(store) => store.workspace_boards(workspace).await,
            Self::Postgres(store) => store.workspace_boards(workspace).await,
        }
    }

    async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError> {
        match self {
            Self::Memory(store) => store.workspace_role(workspace, user).await,
            Self::Postgres(store) => store.workspace_role(workspace, user).await,
        }
    }

    async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError> {
        match self {
            Self::Memory(store) => store.board_role(board, user).await,
            Self::Postgres(store) => store.board_role(board, user).await,
        }
    }

    async fn workspace_members(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(UserId, WorkspaceRole)>, ServiceError> {
        match self {
            Self::Memory(store) => store.workspace_members(workspace).await,
            Self::Postgres(store) => store.workspace_members(workspace).await,
        }
    }

    async fn board_members(
        &self,
        board: BoardId,
    ) -> Result<Vec<(UserId, BoardRole)>, ServiceError> {
        match self {
            Self::Memory(store) => store.board_members(board).await,
            Self::Postgres(store) => store.board_members(board).await,
        }
    }

    async fn version(&self, key: VersionKey) -> Result<Option<u64>, ServiceError> {
        match self {
            Self::Memory(store) => store.version(key).await,
            Self::Postgres(store) => store.version(key).await,
        }
    }

    async fn locate(&self, item: Item) -> Result<Option<Placement>, ServiceError> {
        match self {
            Self::Memory(store) => store.locate(item).await,
            Self::Postgres(store) => store.locate(item).await,
        }
    }

    async fn load_siblings(&self, container: Container) -> Result<Option<Siblings>, ServiceError> {
        match self {
            Self::Memory(store) => store.load_siblings(container).await,
            Self::Postgres(store) => store.load_siblings(container).await,
        }
    }

    async fn children(&self, container: Container) -> Result<Vec<Item>, ServiceError> {
        match self {
            Self::Memory(store) => store.children(container).await,
            Self::Postgres(store) => store.children(container).await,
        }
    }

    async fn assignees(&self, items: &[Item]) -> Result<Vec<(Item, UserId)>, ServiceError> {
        match self {
            Self::Memory(store) => store.assignees(items).await,
            Self::Postgres(store) => store.assignees(items).await,
        }
    }

    async fn user_assignments(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Vec<Item>, ServiceError> {
        match self {
            Self::Memory(store) => store.user_assignments(workspace, user).await,
            Self::Postgres(store) => store.user_assignments(workspace, user).await,
        }
    }

    async fn card_details(&self, card: CardId) -> Result<Option<CardDetails>, ServiceError> {
        match self {
            Self::Memory(store) => store.card_details(card).await,
            Self::Postgres(store) => store.card_details(card).await,
        }
    }

    async fn comments(&self, card: CardId) -> Result<Vec<CommentView>, ServiceError> {
        match self {
            Self::Memory(store) => store.comments(card).await,
            Self::Postgres(store) => store.comments(card).await,
        }
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), ServiceError> {
        match self {
            Self::Memory(store) => store.commit(changes).await,
            Self::Postgres(store) => store.commit(changes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use corkboard_core::{BoardId, Container, Item, ListId, Slot};

    use super::{Change, ChangeSet, VersionKey};

    #[test]
    fn guarding_a_key_twice_keeps_the_first_observation() {
        let key = VersionKey::Children(Container::Board(BoardId::new()));
        let mut changes = ChangeSet::new();
        changes.guard(key, 3).guard(key, 7);
        assert_eq!(changes.guards, vec![(key, 3)]);
    }

    #[test]
    fn reposition_emits_one_change_per_slot() {
        let first = Item::List(ListId::new());
        let second = Item::List(ListId::new());
        let mut changes = ChangeSet::new();
        changes.reposition(&[Slot::new(first, 0), Slot::new(second, 1)]);
        assert_eq!(
            changes.changes,
            vec![
                Change::SetPosition {
                    item: first,
                    position: 0
                },
                Change::SetPosition {
                    item: second,
                    position: 1
                },
            ]
        );
    }
}

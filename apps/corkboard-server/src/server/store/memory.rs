use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use corkboard_core::{
    BoardId, BoardRole, CardId, CommentId, Container, Item, Scope, Slot, UserId, WorkspaceId,
    WorkspaceRole,
};
use tokio::sync::RwLock;

use super::{
    CardDetails, Change, ChangeSet, CommentView, Placement, Repository, Siblings, VersionKey,
};
use crate::server::errors::ServiceError;

/// Process-local backend. Every table sits behind one lock so a commit is
/// trivially atomic.
#[derive(Clone, Default)]
pub(crate) struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    users: HashSet<UserId>,
    workspaces: HashMap<WorkspaceId, WorkspaceRecord>,
    boards: HashMap<BoardId, BoardRecord>,
    items: HashMap<Item, ItemRecord>,
    assignees: HashSet<(Item, UserId)>,
    comments: Vec<CommentRecord>,
    next_seq: u64,
}

struct WorkspaceRecord {
    name: String,
    members: HashMap<UserId, WorkspaceRole>,
    members_version: u64,
}

struct BoardRecord {
    workspace: WorkspaceId,
    name: String,
    members: HashMap<UserId, BoardRole>,
    members_version: u64,
    children_version: u64,
}

struct ItemRecord {
    parent: Container,
    position: u32,
    seq: u64,
    archived: bool,
    title: String,
    description: String,
    children_version: u64,
}

struct CommentRecord {
    comment: CommentId,
    card: CardId,
    author: UserId,
    body: String,
    created_at_unix: i64,
}

impl Tables {
    fn version_mut(&mut self, key: VersionKey) -> Option<&mut u64> {
        match key {
            VersionKey::Members(Scope::Workspace(workspace)) => self
                .workspaces
                .get_mut(&workspace)
                .map(|record| &mut record.members_version),
            VersionKey::Members(Scope::Board(board)) => self
                .boards
                .get_mut(&board)
                .map(|record| &mut record.members_version),
            VersionKey::Children(Container::Board(board)) => self
                .boards
                .get_mut(&board)
                .map(|record| &mut record.children_version),
            VersionKey::Children(container) => container
                .as_item()
                .and_then(|item| self.items.get_mut(&item))
                .map(|record| &mut record.children_version),
        }
    }

    fn version(&self, key: VersionKey) -> Option<u64> {
        match key {
            VersionKey::Members(Scope::Workspace(workspace)) => self
                .workspaces
                .get(&workspace)
                .map(|record| record.members_version),
            VersionKey::Members(Scope::Board(board)) => {
                self.boards.get(&board).map(|record| record.members_version)
            }
            VersionKey::Children(Container::Board(board)) => {
                self.boards.get(&board).map(|record| record.children_version)
            }
            VersionKey::Children(container) => container
                .as_item()
                .and_then(|item| self.items.get(&item))
                .map(|record| record.children_version),
        }
    }

    fn board_of(&self, item: Item) -> Option<BoardId> {
        let mut current = self.items.get(&item)?.parent;
        loop {
            match current {
                Container::Board(board) => return Some(board),
                other => current = self.items.get(&other.as_item()?)?.parent,
            }
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::RegisterUser(user) => {
                self.users.insert(user);
            }
            Change::CreateWorkspace { workspace, name } => {
                self.workspaces.insert(
                    workspace,
                    WorkspaceRecord {
                        name: name.as_str().to_owned(),
                        members: HashMap::new(),
                        members_version: 0,
                    },
                );
            }
            Change::CreateBoard {
                board,
                workspace,
                name,
            } => {
                self.boards.insert(
                    board,
                    BoardRecord {
                        workspace,
                        name: name.as_str().to_owned(),
                        members: HashMap::new(),
                        members_version: 0,
                        children_version: 0,
                    },
                );
            }
            Change::PutWorkspaceMember {
                workspace,
                user,
                role,
            } => {
                if let Some(record) = self.workspaces.get_mut(&workspace) {
                    record.members.insert(user, role);
                }
            }
            Change::RemoveWorkspaceMember { workspace, user } => {
                if let Some(record) = self.workspaces.get_mut(&workspace) {
                    record.members.remove(&user);
                }
            }
            Change::PutBoardMember { board, user, role } => {
                if let Some(record) = self.boards.get_mut(&board) {
                    record.members.insert(user, role);
                }
            }
            Change::RemoveBoardMember { board, user } => {
                if let Some(record) = self.boards.get_mut(&board) {
                    record.members.remove(&user);
                }
            }
            Change::InsertItem {
                item,
                parent,
                position,
                title,
            } => {
                self.next_seq += 1;
                self.items.insert(
                    item,
                    ItemRecord {
                        parent,
                        position,
                        seq: self.next_seq,
                        archived: false,
                        title: title.as_str().to_owned(),
                        description: String::new(),
                        children_version: 0,
                    },
                );
            }
            Change::SetPosition { item, position } => {
                if let Some(record) = self.items.get_mut(&item) {
                    record.position = position;
                }
            }
            Change::Reparent {
                item,
                parent,
                position,
            } => {
                if let Some(record) = self.items.get_mut(&item) {
                    record.parent = parent;
                    record.position = position;
                }
            }
            Change::SetArchived {
                item,
                archived,
                position,
            } => {
                if let Some(record) = self.items.get_mut(&item) {
                    record.archived = archived;
                    record.position = position;
                }
            }
            Change::DeleteItem(item) => {
                self.items.remove(&item);
                self.assignees.retain(|(assigned, _)| *assigned != item);
                if let Item::Card(card) = item {
                    self.comments.retain(|comment| comment.card != card);
                }
            }
            Change::AddAssignee { item, user } => {
                self.assignees.insert((item, user));
            }
            Change::RemoveAssignee { item, user } => {
                self.assignees.remove(&(item, user));
            }
            Change::UpdateCard {
                card,
                title,
                description,
            } => {
                if let Some(record) = self.items.get_mut(&Item::Card(card)) {
                    if let Some(title) = title {
                        record.title = title.as_str().to_owned();
                    }
                    if let Some(description) = description {
                        record.description = description.as_str().to_owned();
                    }
                }
            }
            Change::AddComment {
                comment,
                card,
                author,
                body,
                created_at_unix,
            } => self.comments.push(CommentRecord {
                comment,
                card,
                author,
                body: body.as_str().to_owned(),
                created_at_unix,
            }),
        }
    }
}

impl Repository for InMemoryStore {
    async fn user_exists(&self, user: UserId) -> Result<bool, ServiceError> {
        Ok(self.tables.read().await.users.contains(&user))
    }

    async fn workspace_exists(&self, workspace: WorkspaceId) -> Result<bool, ServiceError> {
        Ok(self.tables.read().await.workspaces.contains_key(&workspace))
    }

    async fn workspace_name(&self, workspace: WorkspaceId) -> Result<Option<String>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .workspaces
            .get(&workspace)
            .map(|record| record.name.clone()))
    }

    async fn board_workspace(&self, board: BoardId) -> Result<Option<WorkspaceId>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .boards
            .get(&board)
            .map(|record| record.workspace))
    }

    async fn board_name(&self, board: BoardId) -> Result<Option<String>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .boards
            .get(&board)
            .map(|record| record.name.clone()))
    }

    async fn workspace_boards(&self, workspace: WorkspaceId) -> Result<Vec<BoardId>, ServiceError> {
        let tables = self.tables.read().await;
        let mut boards: Vec<BoardId> = tables
            .boards
            .iter()
            .filter(|(_, record)| record.workspace == workspace)
            .map(|(board, _)| *board)
            .collect();
        boards.sort();
        Ok(boards)
    }

    async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .workspaces
            .get(&workspace)
            .and_then(|record| record.members.get(&user).copied()))
    }

    async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .boards
            .get(&board)
            .and_then(|record| record.members.get(&user).copied()))
    }

    async fn workspace_members(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(UserId, WorkspaceRole)>, ServiceError> {
        let tables = self.tables.read().await;
        let mut members: Vec<_> = tables
            .workspaces
            .get(&workspace)
            .map(|record| record.members.iter().map(|(u, r)| (*u, *r)).collect())
            .unwrap_or_default();
        members.sort_by_key(|(user, _)| *user);
        Ok(members)
    }

    async fn board_members(
        &self,
        board: BoardId,
    ) -> Result<Vec<(UserId, BoardRole)>, ServiceError> {
        let tables = self.tables.read().await;
        let mut members: Vec<_> = tables
            .boards
            .get(&board)
            .map(|record| record.members.iter().map(|(u, r)| (*u, *r)).collect())
            .unwrap_or_default();
        members.sort_by_key(|(user, _)| *user);
        Ok(members)
    }

    async fn version(&self, key: VersionKey) -> Result<Option<u64>, ServiceError> {
        Ok(self.tables.read().await.version(key))
    }

    async fn locate(&self, item: Item) -> Result<Option<Placement>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .items
            .get(&item)
            .map(|record| Placement {
                parent: record.parent,
                archived: record.archived,
            }))
    }

    async fn load_siblings(&self, container: Container) -> Result<Option<Siblings>, ServiceError> {
        let tables = self.tables.read().await;
        let version = match container.as_item() {
            None => tables.version(VersionKey::Children(container)),
            Some(item) => tables
                .items
                .get(&item)
                .filter(|record| !record.archived)
                .map(|record| record.children_version),
        };
        let Some(version) = version else {
            return Ok(None);
        };

        let mut live: Vec<(&Item, &ItemRecord)> = tables
            .items
            .iter()
            .filter(|(_, record)| record.parent == container && !record.archived)
            .collect();
        live.sort_by_key(|(_, record)| (record.position, record.seq));

        Ok(Some(Siblings {
            container,
            version,
            slots: live
                .into_iter()
                .map(|(item, record)| Slot::new(*item, record.position))
                .collect(),
        }))
    }

    async fn children(&self, container: Container) -> Result<Vec<Item>, ServiceError> {
        let tables = self.tables.read().await;
        let mut children: Vec<(&Item, &ItemRecord)> = tables
            .items
            .iter()
            .filter(|(_, record)| record.parent == container)
            .collect();
        children.sort_by_key(|(_, record)| (record.position, record.seq));
        Ok(children.into_iter().map(|(item, _)| *item).collect())
    }

    async fn assignees(&self, items: &[Item]) -> Result<Vec<(Item, UserId)>, ServiceError> {
        let tables = self.tables.read().await;
        let mut found: Vec<(Item, UserId)> = tables
            .assignees
            .iter()
            .filter(|(item, _)| items.contains(item))
            .copied()
            .collect();
        found.sort_by_key(|(item, user)| (item.id_string(), *user));
        Ok(found)
    }

    async fn user_assignments(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Vec<Item>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignees
            .iter()
            .filter(|(_, assignee)| *assignee == user)
            .filter(|(item, _)| {
                tables
                    .board_of(*item)
                    .and_then(|board| tables.boards.get(&board))
                    .is_some_and(|record| record.workspace == workspace)
            })
            .map(|(item, _)| *item)
            .collect())
    }

    async fn card_details(&self, card: CardId) -> Result<Option<CardDetails>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .items
            .get(&Item::Card(card))
            .map(|record| CardDetails {
                title: record.title.clone(),
                description: record.description.clone(),
                archived: record.archived,
            }))
    }

    async fn comments(&self, card: CardId) -> Result<Vec<CommentView>, ServiceError> {
        Ok(self
            .tables
            .read()
            .await
            .comments
            .iter()
            .filter(|record| record.card == card)
            .map(|record| CommentView {
                comment: record.comment,
                author: record.author,
                body: record.body.clone(),
                created_at_unix: record.created_at_unix,
            })
            .collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), ServiceError> {
        let mut tables = self.tables.write().await;
        for (key, expected) in &changes.guards {
            if tables.version(*key) != Some(*expected) {
                return Err(ServiceError::Conflict);
            }
        }
        for (key, _) in &changes.guards {
            if let Some(version) = tables.version_mut(*key) {
                *version += 1;
            }
        }
        for change in changes.changes {
            tables.apply(change);
        }
        Ok(())
    }
}

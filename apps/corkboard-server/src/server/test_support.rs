use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use corkboard_core::{
    append_position, BoardId, BoardName, BoardRole, CardId, Container, Item, ItemTitle, ListId,
    SubTaskId, TaskId, UserId, WorkspaceId, WorkspaceName, WorkspaceRole,
};

use super::{
    errors::ServiceError,
    realtime::{Audience, RealtimeNotifier},
    store::{
        memory::InMemoryStore, CardDetails, Change, ChangeSet, CommentView, Placement,
        Repository, Siblings, VersionKey,
    },
};

/// One notify call captured by [`RecordingNotifier`].
#[derive(Debug, Clone)]
pub(crate) struct Notification {
    pub(crate) audiences: Vec<Audience>,
    pub(crate) event_type: &'static str,
    pub(crate) payload: serde_json::Value,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    revoked: Arc<Mutex<Vec<(UserId, Vec<Audience>)>>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex").clone()
    }

    pub(crate) fn revoked(&self) -> Vec<(UserId, Vec<Audience>)> {
        self.revoked.lock().expect("notifier mutex").clone()
    }

    pub(crate) fn event_types(&self) -> Vec<&'static str> {
        self.sent()
            .into_iter()
            .map(|notification| notification.event_type)
            .collect()
    }
}

impl RealtimeNotifier for RecordingNotifier {
    async fn notify(
        &self,
        audiences: &[Audience],
        event_type: &'static str,
        payload: serde_json::Value,
    ) {
        self.sent.lock().expect("notifier mutex").push(Notification {
            audiences: audiences.to_vec(),
            event_type,
            payload,
        });
    }

    async fn revoke(&self, user: UserId, audiences: &[Audience]) {
        self.revoked
            .lock()
            .expect("notifier mutex")
            .push((user, audiences.to_vec()));
    }
}

/// Where [`Interleaved`] lets the competing command run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pause {
    BeforeLoadSiblings(Container),
    AfterAssignees,
    BeforeCommit,
}

type Competing = Pin<Box<dyn Future<Output = ()>>>;

/// Repository over a shared [`InMemoryStore`] that runs one competing
/// command to completion the first time the wrapped command reaches `at`.
/// The competing command should talk to the store directly.
pub(crate) struct Interleaved {
    store: InMemoryStore,
    at: Pause,
    competing: Mutex<Option<Competing>>,
}

impl Interleaved {
    pub(crate) fn new(
        store: &InMemoryStore,
        at: Pause,
        competing: impl Future<Output = ()> + 'static,
    ) -> Self {
        Self {
            store: store.clone(),
            at,
            competing: Mutex::new(Some(Box::pin(competing))),
        }
    }

    /// Whether the competing command has run.
    pub(crate) fn fired(&self) -> bool {
        self.competing.lock().expect("interleaving mutex").is_none()
    }

    async fn reach(&self, point: Pause) {
        if point != self.at {
            return;
        }
        let competing = self.competing.lock().expect("interleaving mutex").take();
        if let Some(competing) = competing {
            competing.await;
        }
    }
}

impl Repository for Interleaved {
    async fn user_exists(&self, user: UserId) -> Result<bool, ServiceError> {
        self.store.user_exists(user).await
    }

    async fn workspace_exists(&self, workspace: WorkspaceId) -> Result<bool, ServiceError> {
        self.store.workspace_exists(workspace).await
    }

    async fn workspace_name(&self, workspace: WorkspaceId) -> Result<Option<String>, ServiceError> {
        self.store.workspace_name(workspace).await
    }

    async fn board_workspace(&self, board: BoardId) -> Result<Option<WorkspaceId>, ServiceError> {
        self.store.board_workspace(board).await
    }

    async fn board_name(&self, board: BoardId) -> Result<Option<String>, ServiceError> {
        self.store.board_name(board).await
    }

    async fn workspace_boards(&self, workspace: WorkspaceId) -> Result<Vec<BoardId>, ServiceError> {
        self.store.workspace_boards(workspace).await
    }

    async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError> {
        self.store.workspace_role(workspace, user).await
    }

    async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError> {
        self.store.board_role(board, user).await
    }

    async fn workspace_members(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(UserId, WorkspaceRole)>, ServiceError> {
        self.store.workspace_members(workspace).await
    }

    async fn board_members(
        &self,
        board: BoardId,
    ) -> Result<Vec<(UserId, BoardRole)>, ServiceError> {
        self.store.board_members(board).await
    }

    async fn version(&self, key: VersionKey) -> Result<Option<u64>, ServiceError> {
        self.store.version(key).await
    }

    async fn locate(&self, item: Item) -> Result<Option<Placement>, ServiceError> {
        self.store.locate(item).await
    }

    async fn load_siblings(&self, container: Container) -> Result<Option<Siblings>, ServiceError> {
        self.reach(Pause::BeforeLoadSiblings(container)).await;
        self.store.load_siblings(container).await
    }

    async fn children(&self, container: Container) -> Result<Vec<Item>, ServiceError> {
        self.store.children(container).await
    }

    async fn assignees(&self, items: &[Item]) -> Result<Vec<(Item, UserId)>, ServiceError> {
        let assignees = self.store.assignees(items).await;
        self.reach(Pause::AfterAssignees).await;
        assignees
    }

    async fn user_assignments(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Vec<Item>, ServiceError> {
        self.store.user_assignments(workspace, user).await
    }

    async fn card_details(&self, card: CardId) -> Result<Option<CardDetails>, ServiceError> {
        self.store.card_details(card).await
    }

    async fn comments(&self, card: CardId) -> Result<Vec<CommentView>, ServiceError> {
        self.store.comments(card).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), ServiceError> {
        self.reach(Pause::BeforeCommit).await;
        self.store.commit(changes).await
    }
}

/// A workspace with one board, both owned by `owner`. Seeding helpers write
/// straight through the store and skip every permission check.
pub(crate) struct Fixture {
    pub(crate) store: InMemoryStore,
    pub(crate) notifier: RecordingNotifier,
    pub(crate) owner: UserId,
    pub(crate) workspace: WorkspaceId,
    pub(crate) board: BoardId,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        let store = InMemoryStore::default();
        let owner = UserId::new();
        let workspace = WorkspaceId::new();
        let board = BoardId::new();
        let mut changes = ChangeSet::new();
        changes
            .push(Change::RegisterUser(owner))
            .push(Change::CreateWorkspace {
                workspace,
                name: WorkspaceName::try_from(String::from("Acme")).unwrap(),
            })
            .push(Change::PutWorkspaceMember {
                workspace,
                user: owner,
                role: WorkspaceRole::Owner,
            })
            .push(Change::CreateBoard {
                board,
                workspace,
                name: BoardName::try_from(String::from("Roadmap")).unwrap(),
            })
            .push(Change::PutBoardMember {
                board,
                user: owner,
                role: BoardRole::Owner,
            });
        store.commit(changes).await.unwrap();

        Self {
            store,
            notifier: RecordingNotifier::default(),
            owner,
            workspace,
            board,
        }
    }

    async fn apply(&self, change: Change) {
        let mut changes = ChangeSet::new();
        changes.push(change);
        self.store.commit(changes).await.unwrap();
    }

    pub(crate) async fn user(&self) -> UserId {
        let user = UserId::new();
        self.apply(Change::RegisterUser(user)).await;
        user
    }

    pub(crate) async fn set_workspace_role(&self, user: UserId, role: WorkspaceRole) {
        self.apply(Change::PutWorkspaceMember {
            workspace: self.workspace,
            user,
            role,
        })
        .await;
    }

    pub(crate) async fn set_board_role(&self, user: UserId, role: BoardRole) {
        self.apply(Change::PutBoardMember {
            board: self.board,
            user,
            role,
        })
        .await;
    }

    pub(crate) async fn workspace_member(&self, role: WorkspaceRole) -> UserId {
        let user = self.user().await;
        self.set_workspace_role(user, role).await;
        user
    }

    /// A plain workspace member holding `role` on the fixture board.
    pub(crate) async fn board_member(&self, role: BoardRole) -> UserId {
        let user = self.workspace_member(WorkspaceRole::Member).await;
        self.set_board_role(user, role).await;
        user
    }

    pub(crate) async fn second_board(&self) -> BoardId {
        let board = BoardId::new();
        self.apply(Change::CreateBoard {
            board,
            workspace: self.workspace,
            name: BoardName::try_from(String::from("Backlog")).unwrap(),
        })
        .await;
        self.apply(Change::PutBoardMember {
            board,
            user: self.owner,
            role: BoardRole::Owner,
        })
        .await;
        board
    }

    pub(crate) async fn put_board_role(&self, board: BoardId, user: UserId, role: BoardRole) {
        self.apply(Change::PutBoardMember { board, user, role }).await;
    }

    /// Appends a fresh child at the end of `parent`.
    pub(crate) async fn item_in(&self, parent: Container) -> Item {
        let item = match parent {
            Container::Board(_) => Item::List(ListId::new()),
            Container::List(_) => Item::Card(CardId::new()),
            Container::Card(_) => Item::Task(TaskId::new()),
            Container::Task(_) => Item::SubTask(SubTaskId::new()),
        };
        let siblings = self.store.load_siblings(parent).await.unwrap().unwrap();
        self.apply(Change::InsertItem {
            item,
            parent,
            position: append_position(&siblings.slots),
            title: ItemTitle::try_from(format!("{} item", parent.child_kind().as_str())).unwrap(),
        })
        .await;
        item
    }

    pub(crate) async fn list(&self) -> Item {
        self.item_in(Container::Board(self.board)).await
    }

    pub(crate) async fn child(&self, parent: Item) -> Item {
        let container = parent.as_container().expect("subtasks have no children");
        self.item_in(container).await
    }

    pub(crate) async fn assign(&self, item: Item, user: UserId) {
        self.apply(Change::AddAssignee { item, user }).await;
    }

    /// Current live order of `container`.
    pub(crate) async fn order(&self, container: Container) -> Vec<(Item, u32)> {
        self.store
            .load_siblings(container)
            .await
            .unwrap()
            .unwrap()
            .slots
            .into_iter()
            .map(|slot| (slot.id, slot.position))
            .collect()
    }
}

pub(crate) fn card_id(item: Item) -> CardId {
    match item {
        Item::Card(card) => card,
        other => panic!("expected a card, got {other}"),
    }
}

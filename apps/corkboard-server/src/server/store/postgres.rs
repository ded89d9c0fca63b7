use std::{str::FromStr, sync::Arc};

use corkboard_core::{
    BoardId, BoardRole, CardId, Container, DomainError, Item, ItemKind, Scope, Slot, UserId,
    WorkspaceId, WorkspaceRole,
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::OnceCell;

use super::{
    CardDetails, Change, ChangeSet, CommentView, Placement, Repository, Siblings, VersionKey,
};
use crate::server::errors::ServiceError;

const SCHEMA_INIT_LOCK_ID: i64 = 0x434f_524b_424f_4152;

const SCHEMA: [&str; 10] = [
    "CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS workspaces (
        workspace_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        members_version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS workspace_members (
        workspace_id TEXT NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        role SMALLINT NOT NULL,
        PRIMARY KEY(workspace_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS boards (
        board_id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        members_version BIGINT NOT NULL DEFAULT 0,
        children_version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS board_members (
        board_id TEXT NOT NULL REFERENCES boards(board_id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        role SMALLINT NOT NULL,
        PRIMARY KEY(board_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS items (
        item_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        position BIGINT NOT NULL,
        seq BIGSERIAL,
        archived BOOLEAN NOT NULL DEFAULT FALSE,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        children_version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_items_parent_position
        ON items(parent_id, position, seq)",
    "CREATE TABLE IF NOT EXISTS item_assignees (
        item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        PRIMARY KEY(item_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS card_comments (
        comment_id TEXT PRIMARY KEY,
        card_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
        author_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        body TEXT NOT NULL,
        created_at_unix BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_card_comments_card_created
        ON card_comments(card_id, created_at_unix)",
];

/// Postgres backend. The schema is created lazily on first use.
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
    init: Arc<OnceCell<()>>,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self {
            pool,
            init: Arc::new(OnceCell::new()),
        }
    }

    async fn pool(&self) -> Result<&PgPool, ServiceError> {
        let pool = &self.pool;
        self.init
            .get_or_try_init(|| async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(SCHEMA_INIT_LOCK_ID)
                    .execute(&mut *tx)
                    .await?;
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&mut *tx).await?;
                }
                tx.commit().await?;
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                tracing::error!(event = "db.init", error = %e);
                ServiceError::Internal
            })?;
        Ok(pool)
    }

    async fn optional_string(
        &self,
        sql: &'static str,
        id: String,
        column: &'static str,
    ) -> Result<Option<String>, ServiceError> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?;
        row.map(|row| row.try_get::<String, _>(column).map_err(internal))
            .transpose()
    }
}

fn internal(error: sqlx::Error) -> ServiceError {
    tracing::error!(event = "db.query", error = %error);
    ServiceError::Internal
}

/// SQLSTATE classes Postgres asks the client to retry: serialization
/// failure and detected deadlock.
fn is_retryable_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01")
}

/// Like [`internal`], but a write that lost a lock race is a conflict the
/// caller may retry.
fn write_error(error: sqlx::Error) -> ServiceError {
    let retryable = error
        .as_database_error()
        .and_then(|database| database.code())
        .is_some_and(|code| is_retryable_sqlstate(&code));
    if retryable {
        tracing::warn!(event = "db.write_conflict", error = %error);
        return ServiceError::Conflict;
    }
    internal(error)
}

fn parse_id<T: FromStr<Err = DomainError>>(value: &str) -> Result<T, ServiceError> {
    value.parse().map_err(|_| {
        tracing::error!(event = "db.decode", value, "stored identifier is not a ULID");
        ServiceError::Internal
    })
}

fn position_from_i64(value: i64) -> Result<u32, ServiceError> {
    u32::try_from(value).map_err(|_| ServiceError::Internal)
}

fn version_from_i64(value: i64) -> Result<u64, ServiceError> {
    u64::try_from(value).map_err(|_| ServiceError::Internal)
}

fn version_to_i64(value: u64) -> Result<i64, ServiceError> {
    i64::try_from(value).map_err(|_| ServiceError::Internal)
}

pub(crate) fn workspace_role_to_i16(role: WorkspaceRole) -> i16 {
    match role {
        WorkspaceRole::Owner => 2,
        WorkspaceRole::Admin => 1,
        WorkspaceRole::Member => 0,
    }
}

pub(crate) fn workspace_role_from_i16(value: i16) -> Option<WorkspaceRole> {
    match value {
        2 => Some(WorkspaceRole::Owner),
        1 => Some(WorkspaceRole::Admin),
        0 => Some(WorkspaceRole::Member),
        _ => None,
    }
}

pub(crate) fn board_role_to_i16(role: BoardRole) -> i16 {
    match role {
        BoardRole::Owner => 2,
        BoardRole::Editor => 1,
        BoardRole::Viewer => 0,
    }
}

pub(crate) fn board_role_from_i16(value: i16) -> Option<BoardRole> {
    match value {
        2 => Some(BoardRole::Owner),
        1 => Some(BoardRole::Editor),
        0 => Some(BoardRole::Viewer),
        _ => None,
    }
}

/// Table, counter column, key column and key value behind a version guard.
fn version_target(key: VersionKey) -> (&'static str, &'static str, &'static str, String) {
    match key {
        VersionKey::Members(Scope::Workspace(id)) => (
            "workspaces",
            "members_version",
            "workspace_id",
            id.to_string(),
        ),
        VersionKey::Members(Scope::Board(id)) => {
            ("boards", "members_version", "board_id", id.to_string())
        }
        VersionKey::Children(Container::Board(id)) => {
            ("boards", "children_version", "board_id", id.to_string())
        }
        VersionKey::Children(container) => (
            "items",
            "children_version",
            "item_id",
            container.id_string(),
        ),
    }
}

/// Guards sorted by the row they bump, so every commit takes its version row
/// locks in the same order.
fn lock_order(guards: &[(VersionKey, u64)]) -> Vec<(VersionKey, u64)> {
    let mut ordered = guards.to_vec();
    ordered.sort_by_cached_key(|(key, _)| {
        let (table, _, _, id) = version_target(*key);
        (table, id)
    });
    ordered
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<Item, ServiceError> {
    let id: String = row.try_get("item_id").map_err(internal)?;
    let kind: String = row.try_get("kind").map_err(internal)?;
    let kind = ItemKind::try_from(kind).map_err(|_| ServiceError::Internal)?;
    Item::parse(kind, &id).map_err(|_| ServiceError::Internal)
}

#[allow(clippy::too_many_lines)]
async fn apply(tx: &mut Transaction<'_, Postgres>, change: Change) -> Result<(), ServiceError> {
    let query = match change {
        Change::RegisterUser(user) => {
            sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(user.to_string())
        }
        Change::CreateWorkspace { workspace, name } => {
            sqlx::query("INSERT INTO workspaces (workspace_id, name) VALUES ($1, $2)")
                .bind(workspace.to_string())
                .bind(name.as_str().to_owned())
        }
        Change::CreateBoard {
            board,
            workspace,
            name,
        } => sqlx::query("INSERT INTO boards (board_id, workspace_id, name) VALUES ($1, $2, $3)")
            .bind(board.to_string())
            .bind(workspace.to_string())
            .bind(name.as_str().to_owned()),
        Change::PutWorkspaceMember {
            workspace,
            user,
            role,
        } => sqlx::query(
            "INSERT INTO workspace_members (workspace_id, user_id, role)
             VALUES ($1, $2, $3)
             ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(workspace.to_string())
        .bind(user.to_string())
        .bind(workspace_role_to_i16(role)),
        Change::RemoveWorkspaceMember { workspace, user } => {
            sqlx::query("DELETE FROM workspace_members WHERE workspace_id = $1 AND user_id = $2")
                .bind(workspace.to_string())
                .bind(user.to_string())
        }
        Change::PutBoardMember { board, user, role } => sqlx::query(
            "INSERT INTO board_members (board_id, user_id, role)
             VALUES ($1, $2, $3)
             ON CONFLICT (board_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(board.to_string())
        .bind(user.to_string())
        .bind(board_role_to_i16(role)),
        Change::RemoveBoardMember { board, user } => {
            sqlx::query("DELETE FROM board_members WHERE board_id = $1 AND user_id = $2")
                .bind(board.to_string())
                .bind(user.to_string())
        }
        Change::InsertItem {
            item,
            parent,
            position,
            title,
        } => sqlx::query(
            "INSERT INTO items (item_id, kind, parent_id, position, title)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(item.id_string())
        .bind(item.kind().as_str())
        .bind(parent.id_string())
        .bind(i64::from(position))
        .bind(title.as_str().to_owned()),
        Change::SetPosition { item, position } => {
            sqlx::query("UPDATE items SET position = $2 WHERE item_id = $1")
                .bind(item.id_string())
                .bind(i64::from(position))
        }
        Change::Reparent {
            item,
            parent,
            position,
        } => sqlx::query("UPDATE items SET parent_id = $2, position = $3 WHERE item_id = $1")
            .bind(item.id_string())
            .bind(parent.id_string())
            .bind(i64::from(position)),
        Change::SetArchived {
            item,
            archived,
            position,
        } => sqlx::query("UPDATE items SET archived = $2, position = $3 WHERE item_id = $1")
            .bind(item.id_string())
            .bind(archived)
            .bind(i64::from(position)),
        Change::DeleteItem(item) => {
            sqlx::query("DELETE FROM items WHERE item_id = $1").bind(item.id_string())
        }
        Change::AddAssignee { item, user } => sqlx::query(
            "INSERT INTO item_assignees (item_id, user_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(item.id_string())
        .bind(user.to_string()),
        Change::RemoveAssignee { item, user } => {
            sqlx::query("DELETE FROM item_assignees WHERE item_id = $1 AND user_id = $2")
                .bind(item.id_string())
                .bind(user.to_string())
        }
        Change::UpdateCard {
            card,
            title,
            description,
        } => sqlx::query(
            "UPDATE items
             SET title = COALESCE($2, title), description = COALESCE($3, description)
             WHERE item_id = $1 AND kind = 'card'",
        )
        .bind(card.to_string())
        .bind(title.map(|title| title.as_str().to_owned()))
        .bind(description.map(|description| description.as_str().to_owned())),
        Change::AddComment {
            comment,
            card,
            author,
            body,
            created_at_unix,
        } => sqlx::query(
            "INSERT INTO card_comments (comment_id, card_id, author_id, body, created_at_unix)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(comment.to_string())
        .bind(card.to_string())
        .bind(author.to_string())
        .bind(body.as_str().to_owned())
        .bind(created_at_unix),
    };
    query.execute(&mut **tx).await.map_err(write_error)?;
    Ok(())
}

impl Repository for PgStore {
    async fn user_exists(&self, user: UserId) -> Result<bool, ServiceError> {
        Ok(sqlx::query("SELECT 1 FROM users WHERE user_id = $1")
            .bind(user.to_string())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?
            .is_some())
    }

    async fn workspace_exists(&self, workspace: WorkspaceId) -> Result<bool, ServiceError> {
        Ok(sqlx::query("SELECT 1 FROM workspaces WHERE workspace_id = $1")
            .bind(workspace.to_string())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?
            .is_some())
    }

    async fn workspace_name(&self, workspace: WorkspaceId) -> Result<Option<String>, ServiceError> {
        self.optional_string(
            "SELECT name FROM workspaces WHERE workspace_id = $1",
            workspace.to_string(),
            "name",
        )
        .await
    }

    async fn board_workspace(&self, board: BoardId) -> Result<Option<WorkspaceId>, ServiceError> {
        self.optional_string(
            "SELECT workspace_id FROM boards WHERE board_id = $1",
            board.to_string(),
            "workspace_id",
        )
        .await?
        .map(|id| parse_id(&id))
        .transpose()
    }

    async fn board_name(&self, board: BoardId) -> Result<Option<String>, ServiceError> {
        self.optional_string(
            "SELECT name FROM boards WHERE board_id = $1",
            board.to_string(),
            "name",
        )
        .await
    }

    async fn workspace_boards(&self, workspace: WorkspaceId) -> Result<Vec<BoardId>, ServiceError> {
        let rows =
            sqlx::query("SELECT board_id FROM boards WHERE workspace_id = $1 ORDER BY board_id")
                .bind(workspace.to_string())
                .fetch_all(self.pool().await?)
                .await
                .map_err(internal)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("board_id").map_err(internal)?;
                parse_id(&id)
            })
            .collect()
    }

    async fn workspace_role(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Option<WorkspaceRole>, ServiceError> {
        let row = sqlx::query(
            "SELECT role FROM workspace_members WHERE workspace_id = $1 AND user_id = $2",
        )
        .bind(workspace.to_string())
        .bind(user.to_string())
        .fetch_optional(self.pool().await?)
        .await
        .map_err(internal)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value: i16 = row.try_get("role").map_err(internal)?;
        workspace_role_from_i16(value)
            .map(Some)
            .ok_or(ServiceError::Internal)
    }

    async fn board_role(
        &self,
        board: BoardId,
        user: UserId,
    ) -> Result<Option<BoardRole>, ServiceError> {
        let row = sqlx::query("SELECT role FROM board_members WHERE board_id = $1 AND user_id = $2")
            .bind(board.to_string())
            .bind(user.to_string())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value: i16 = row.try_get("role").map_err(internal)?;
        board_role_from_i16(value)
            .map(Some)
            .ok_or(ServiceError::Internal)
    }

    async fn workspace_members(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(UserId, WorkspaceRole)>, ServiceError> {
        let rows = sqlx::query(
            "SELECT user_id, role FROM workspace_members
             WHERE workspace_id = $1
             ORDER BY user_id",
        )
        .bind(workspace.to_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter()
            .map(|row| {
                let user: String = row.try_get("user_id").map_err(internal)?;
                let role: i16 = row.try_get("role").map_err(internal)?;
                let role = workspace_role_from_i16(role).ok_or(ServiceError::Internal)?;
                Ok((parse_id(&user)?, role))
            })
            .collect()
    }

    async fn board_members(
        &self,
        board: BoardId,
    ) -> Result<Vec<(UserId, BoardRole)>, ServiceError> {
        let rows = sqlx::query(
            "SELECT user_id, role FROM board_members
             WHERE board_id = $1
             ORDER BY user_id",
        )
        .bind(board.to_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter()
            .map(|row| {
                let user: String = row.try_get("user_id").map_err(internal)?;
                let role: i16 = row.try_get("role").map_err(internal)?;
                let role = board_role_from_i16(role).ok_or(ServiceError::Internal)?;
                Ok((parse_id(&user)?, role))
            })
            .collect()
    }

    async fn version(&self, key: VersionKey) -> Result<Option<u64>, ServiceError> {
        let (table, column, key_column, id) = version_target(key);
        let sql = format!("SELECT {column} AS version FROM {table} WHERE {key_column} = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?;
        row.map(|row| {
            row.try_get::<i64, _>("version")
                .map_err(internal)
                .and_then(version_from_i64)
        })
        .transpose()
    }

    async fn locate(&self, item: Item) -> Result<Option<Placement>, ServiceError> {
        let row = sqlx::query("SELECT parent_id, archived FROM items WHERE item_id = $1 AND kind = $2")
            .bind(item.id_string())
            .bind(item.kind().as_str())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let parent: String = row.try_get("parent_id").map_err(internal)?;
        let archived: bool = row.try_get("archived").map_err(internal)?;
        let parent =
            Container::parse_for_child(item.kind(), &parent).map_err(|_| ServiceError::Internal)?;
        Ok(Some(Placement { parent, archived }))
    }

    async fn load_siblings(&self, container: Container) -> Result<Option<Siblings>, ServiceError> {
        let version = match container {
            Container::Board(_) => self.version(VersionKey::Children(container)).await?,
            _ => sqlx::query(
                "SELECT children_version FROM items WHERE item_id = $1 AND archived = FALSE",
            )
            .bind(container.id_string())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(internal)?
            .map(|row| {
                row.try_get::<i64, _>("children_version")
                    .map_err(internal)
                    .and_then(version_from_i64)
            })
            .transpose()?,
        };
        let Some(version) = version else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT item_id, position FROM items
             WHERE parent_id = $1 AND archived = FALSE
             ORDER BY position, seq",
        )
        .bind(container.id_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        let child_kind = container.child_kind();
        let slots = rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("item_id").map_err(internal)?;
                let position: i64 = row.try_get("position").map_err(internal)?;
                let item = Item::parse(child_kind, &id).map_err(|_| ServiceError::Internal)?;
                Ok(Slot::new(item, position_from_i64(position)?))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(Some(Siblings {
            container,
            version,
            slots,
        }))
    }

    async fn children(&self, container: Container) -> Result<Vec<Item>, ServiceError> {
        let rows = sqlx::query(
            "SELECT item_id, kind FROM items WHERE parent_id = $1 ORDER BY position, seq",
        )
        .bind(container.id_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter().map(item_from_row).collect()
    }

    async fn assignees(&self, items: &[Item]) -> Result<Vec<(Item, UserId)>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = items.iter().map(|item| item.id_string()).collect();
        let rows = sqlx::query(
            "SELECT a.item_id, i.kind, a.user_id
             FROM item_assignees a
             JOIN items i ON i.item_id = a.item_id
             WHERE a.item_id = ANY($1)
             ORDER BY a.item_id, a.user_id",
        )
        .bind(ids)
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter()
            .map(|row| {
                let user: String = row.try_get("user_id").map_err(internal)?;
                Ok((item_from_row(row)?, parse_id(&user)?))
            })
            .collect()
    }

    async fn user_assignments(
        &self,
        workspace: WorkspaceId,
        user: UserId,
    ) -> Result<Vec<Item>, ServiceError> {
        let rows = sqlx::query(
            "WITH RECURSIVE chain AS (
                SELECT a.item_id AS origin, i.kind AS origin_kind, i.parent_id
                FROM item_assignees a
                JOIN items i ON i.item_id = a.item_id
                WHERE a.user_id = $1
                UNION ALL
                SELECT c.origin, c.origin_kind, p.parent_id
                FROM chain c
                JOIN items p ON p.item_id = c.parent_id
             )
             SELECT c.origin AS item_id, c.origin_kind AS kind
             FROM chain c
             JOIN boards b ON b.board_id = c.parent_id
             WHERE b.workspace_id = $2",
        )
        .bind(user.to_string())
        .bind(workspace.to_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter().map(item_from_row).collect()
    }

    async fn card_details(&self, card: CardId) -> Result<Option<CardDetails>, ServiceError> {
        let row = sqlx::query(
            "SELECT title, description, archived FROM items WHERE item_id = $1 AND kind = 'card'",
        )
        .bind(card.to_string())
        .fetch_optional(self.pool().await?)
        .await
        .map_err(internal)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(CardDetails {
            title: row.try_get("title").map_err(internal)?,
            description: row.try_get("description").map_err(internal)?,
            archived: row.try_get("archived").map_err(internal)?,
        }))
    }

    async fn comments(&self, card: CardId) -> Result<Vec<CommentView>, ServiceError> {
        let rows = sqlx::query(
            "SELECT comment_id, author_id, body, created_at_unix
             FROM card_comments
             WHERE card_id = $1
             ORDER BY created_at_unix, comment_id",
        )
        .bind(card.to_string())
        .fetch_all(self.pool().await?)
        .await
        .map_err(internal)?;
        rows.iter()
            .map(|row| {
                let comment: String = row.try_get("comment_id").map_err(internal)?;
                let author: String = row.try_get("author_id").map_err(internal)?;
                Ok(CommentView {
                    comment: parse_id(&comment)?,
                    author: parse_id(&author)?,
                    body: row.try_get("body").map_err(internal)?,
                    created_at_unix: row.try_get("created_at_unix").map_err(internal)?,
                })
            })
            .collect()
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), ServiceError> {
        let mut tx = self.pool().await?.begin().await.map_err(internal)?;
        for (key, expected) in lock_order(&changes.guards) {
            let (table, column, key_column, id) = version_target(key);
            let sql = format!(
                "UPDATE {table} SET {column} = {column} + 1
                 WHERE {key_column} = $1 AND {column} = $2"
            );
            let result = sqlx::query(&sql)
                .bind(id)
                .bind(version_to_i64(expected)?)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            if result.rows_affected() == 0 {
                // dropping the transaction rolls back earlier bumps
                return Err(ServiceError::Conflict);
            }
        }
        for change in changes.changes {
            apply(&mut tx, change).await?;
        }
        tx.commit().await.map_err(write_error)?;
        Ok(())
    }
}

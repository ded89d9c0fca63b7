use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use corkboard_core::{Item, Slot};
use serde::{Deserialize, Serialize};

use super::{core::METRICS_TEXT_CONTENT_TYPE, metrics::render_metrics};

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<String>,
}

impl ErrorBody {
    pub(crate) const fn new(error: &'static str) -> Self {
        Self {
            error,
            reason: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub(crate) async fn metrics() -> Response {
    (
        [(CONTENT_TYPE, METRICS_TEXT_CONTENT_TYPE)],
        render_metrics(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateWorkspaceRequest {
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkspaceResponse {
    pub(crate) workspace_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateBoardRequest {
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct BoardResponse {
    pub(crate) board_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AddMemberRequest {
    pub(crate) user_id: String,
    pub(crate) role: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UpdateMemberRoleRequest {
    pub(crate) role: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MemberResponse {
    pub(crate) user_id: String,
    pub(crate) role: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateItemRequest {
    pub(crate) kind: String,
    pub(crate) parent_id: String,
    pub(crate) title: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReorderItemRequest {
    pub(crate) index: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MoveItemRequest {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) index: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemResponse {
    pub(crate) item: Item,
    pub(crate) position: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct OrderingResponse {
    pub(crate) items: Vec<Slot<Item>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) item: Item,
    pub(crate) user_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MoveResponse {
    pub(crate) item: Item,
    pub(crate) position: u32,
    pub(crate) removed_assignees: Vec<AssignmentResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChangedResponse {
    pub(crate) changed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UpdateCardRequest {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AssigneeRequest {
    pub(crate) user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateCommentRequest {
    pub(crate) body: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentResponse {
    pub(crate) comment_id: String,
    pub(crate) author_id: String,
    pub(crate) body: String,
    pub(crate) created_at_unix: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentListResponse {
    pub(crate) comments: Vec<CommentResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CardResponse {
    pub(crate) card_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) archived: bool,
    pub(crate) assignees: Vec<String>,
    pub(crate) tasks: Vec<Slot<Item>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkspaceDetailResponse {
    pub(crate) workspace_id: String,
    pub(crate) name: String,
    pub(crate) boards: Vec<String>,
    pub(crate) members: Vec<MemberResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BoardDetailResponse {
    pub(crate) board_id: String,
    pub(crate) workspace_id: String,
    pub(crate) name: String,
    pub(crate) members: Vec<MemberResponse>,
    pub(crate) lists: Vec<Slot<Item>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspacePath {
    pub(crate) workspace_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspaceMemberPath {
    pub(crate) workspace_id: String,
    pub(crate) user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BoardPath {
    pub(crate) board_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BoardMemberPath {
    pub(crate) board_id: String,
    pub(crate) user_id: String,
}

/// `kind` is `board`, `list`, `card`, `task` or `subtask`.
#[derive(Debug, Deserialize)]
pub(crate) struct ItemPath {
    pub(crate) kind: String,
    pub(crate) item_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssigneePath {
    pub(crate) kind: String,
    pub(crate) item_id: String,
    pub(crate) user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CardPath {
    pub(crate) card_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RealtimeQuery {
    pub(crate) workspace_id: Option<String>,
    pub(crate) board_id: Option<String>,
}

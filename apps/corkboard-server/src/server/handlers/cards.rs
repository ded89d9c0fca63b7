use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use corkboard_core::{CardDescription, CardId, CommentBody, ItemTitle, UserId};

use super::{parse_item, Actor};
use crate::server::{
    cards::{add_comment, assign, card_details, list_comments, unassign, update_card},
    core::AppState,
    errors::ServiceError,
    store::{CardDetails, CommentView},
    types::{
        AssigneePath, AssigneeRequest, CardPath, CardResponse, ChangedResponse,
        CommentListResponse, CommentResponse, CreateCommentRequest, ItemPath, UpdateCardRequest,
    },
};

fn card_response(card: CardId, details: CardDetails) -> CardResponse {
    CardResponse {
        card_id: card.to_string(),
        title: details.title,
        description: details.description,
        archived: details.archived,
        assignees: Vec::new(),
        tasks: Vec::new(),
    }
}

fn comment_response(comment: CommentView) -> CommentResponse {
    CommentResponse {
        comment_id: comment.comment.to_string(),
        author_id: comment.author.to_string(),
        body: comment.body,
        created_at_unix: comment.created_at_unix,
    }
}

pub(crate) async fn get_card(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<CardPath>,
) -> Result<Json<CardResponse>, ServiceError> {
    let card: CardId = path.card_id.parse()?;
    let view = card_details(&state.store, actor, card).await?;
    Ok(Json(CardResponse {
        assignees: view.assignees.iter().map(ToString::to_string).collect(),
        tasks: view.tasks,
        ..card_response(card, view.details)
    }))
}

pub(crate) async fn patch_card(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<CardPath>,
    Json(payload): Json<UpdateCardRequest>,
) -> Result<Json<CardResponse>, ServiceError> {
    let card: CardId = path.card_id.parse()?;
    let title = payload.title.map(ItemTitle::try_from).transpose()?;
    let description = payload
        .description
        .map(CardDescription::try_from)
        .transpose()?;
    let details = update_card(&state.store, &state.hub, actor, card, title, description).await?;
    Ok(Json(card_response(card, details)))
}

pub(crate) async fn post_assignee(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
    Json(payload): Json<AssigneeRequest>,
) -> Result<Json<ChangedResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let user: UserId = payload.user_id.parse()?;
    let changed = assign(&state.store, &state.hub, actor, item, user).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub(crate) async fn delete_assignee(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<AssigneePath>,
) -> Result<Json<ChangedResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let user: UserId = path.user_id.parse()?;
    let changed = unassign(&state.store, &state.hub, actor, item, user).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub(crate) async fn post_comment(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<CardPath>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ServiceError> {
    let card: CardId = path.card_id.parse()?;
    let body = CommentBody::try_from(payload.body)?;
    let comment = add_comment(&state.store, &state.hub, actor, card, body).await?;
    Ok((StatusCode::CREATED, Json(comment_response(comment))))
}

pub(crate) async fn get_comments(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<CardPath>,
) -> Result<Json<CommentListResponse>, ServiceError> {
    let card: CardId = path.card_id.parse()?;
    let comments = list_comments(&state.store, actor, card).await?;
    Ok(Json(CommentListResponse {
        comments: comments.into_iter().map(comment_response).collect(),
    }))
}

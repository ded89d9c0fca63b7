use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use corkboard_core::{Container, ItemKind, ItemTitle};

use super::{parse_container, parse_item, Actor};
use crate::server::{
    core::AppState,
    errors::ServiceError,
    mover::move_across_containers,
    ordering::{archive_item, create_item, delete_item, list_children, reorder_item, restore_item},
    types::{
        AssignmentResponse, ChangedResponse, CreateItemRequest, ItemPath, ItemResponse,
        MoveItemRequest, MoveResponse, OrderingResponse, ReorderItemRequest,
    },
};

pub(crate) async fn post_item(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), ServiceError> {
    let kind = ItemKind::try_from(payload.kind)?;
    let parent = Container::parse_for_child(kind, &payload.parent_id)?;
    let title = ItemTitle::try_from(payload.title)?;
    let slot = create_item(&state.store, &state.hub, actor, parent, title).await?;
    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            item: slot.id,
            position: slot.position,
        }),
    ))
}

pub(crate) async fn get_children(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
) -> Result<Json<OrderingResponse>, ServiceError> {
    let container = parse_container(path.kind, &path.item_id)?;
    let items = list_children(&state.store, actor, container).await?;
    Ok(Json(OrderingResponse { items }))
}

pub(crate) async fn post_reorder(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
    Json(payload): Json<ReorderItemRequest>,
) -> Result<Json<OrderingResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let items = reorder_item(&state.store, &state.hub, actor, item, payload.index).await?;
    Ok(Json(OrderingResponse { items }))
}

pub(crate) async fn post_move(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
    Json(payload): Json<MoveItemRequest>,
) -> Result<Json<MoveResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let from = Container::parse_for_child(item.kind(), &payload.from)?;
    let to = Container::parse_for_child(item.kind(), &payload.to)?;
    let outcome =
        move_across_containers(&state.store, &state.hub, actor, item, from, to, payload.index)
            .await?;
    Ok(Json(MoveResponse {
        item,
        position: outcome.position,
        removed_assignees: outcome
            .removed_assignees
            .into_iter()
            .map(|(item, user)| AssignmentResponse {
                item,
                user_id: user.to_string(),
            })
            .collect(),
    }))
}

pub(crate) async fn remove_item(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
) -> Result<StatusCode, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    delete_item(&state.store, &state.hub, actor, item).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn post_archive(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
) -> Result<Json<ChangedResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let changed = archive_item(&state.store, &state.hub, actor, item).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub(crate) async fn post_restore(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<ItemPath>,
) -> Result<Json<ChangedResponse>, ServiceError> {
    let item = parse_item(path.kind, &path.item_id)?;
    let changed = restore_item(&state.store, &state.hub, actor, item).await?;
    Ok(Json(ChangedResponse { changed }))
}

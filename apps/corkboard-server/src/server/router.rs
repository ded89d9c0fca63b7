use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    handlers::{
        create_user, delete_assignee, delete_board_member, delete_workspace_member, get_board,
        get_card, get_children, get_comments, get_workspace, patch_board_member, patch_card,
        patch_workspace_member, post_archive, post_assignee, post_board, post_board_member,
        post_comment, post_item, post_move, post_reorder, post_restore, post_workspace,
        post_workspace_member, remove_item,
    },
    realtime::realtime_ws,
    types::{health, metrics},
};

/// Build the axum router with global security middleware.
///
/// # Errors
/// Returns an error if configured limits are invalid or the storage pool
/// cannot be created.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    if config.max_realtime_event_bytes > corkboard_protocol::MAX_EVENT_BYTES {
        return Err(anyhow!(
            "realtime event limit cannot exceed protocol max of {} bytes",
            corkboard_protocol::MAX_EVENT_BYTES
        ));
    }
    if config.rate_limit_requests_per_minute == 0 {
        return Err(anyhow!("rate limit must be at least 1 request per minute"));
    }
    if config.realtime_outbound_queue == 0 {
        return Err(anyhow!(
            "realtime outbound queue must hold at least 1 event"
        ));
    }
    if config.request_timeout.is_zero() {
        return Err(anyhow!("request timeout must be greater than zero"));
    }

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .period(Duration::from_secs(60))
            .burst_size(config.rate_limit_requests_per_minute)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("invalid governor configuration"))?,
    );
    let app_state = AppState::new(config)?;
    let request_id_header = HeaderName::from_static("x-request-id");
    let governor_layer = GovernorLayer::new(governor_config);

    let routes = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/users", post(create_user))
        .route("/workspaces", post(post_workspace))
        .route("/workspaces/{workspace_id}", get(get_workspace))
        .route("/workspaces/{workspace_id}/boards", post(post_board))
        .route(
            "/workspaces/{workspace_id}/members",
            post(post_workspace_member),
        )
        .route(
            "/workspaces/{workspace_id}/members/{user_id}",
            delete(delete_workspace_member).patch(patch_workspace_member),
        )
        .route("/boards/{board_id}", get(get_board))
        .route("/boards/{board_id}/members", post(post_board_member))
        .route(
            "/boards/{board_id}/members/{user_id}",
            delete(delete_board_member).patch(patch_board_member),
        )
        .route("/items", post(post_item))
        .route("/items/{kind}/{item_id}", delete(remove_item))
        .route("/items/{kind}/{item_id}/children", get(get_children))
        .route("/items/{kind}/{item_id}/reorder", post(post_reorder))
        .route("/items/{kind}/{item_id}/move", post(post_move))
        .route("/items/{kind}/{item_id}/archive", post(post_archive))
        .route("/items/{kind}/{item_id}/restore", post(post_restore))
        .route("/items/{kind}/{item_id}/assignees", post(post_assignee))
        .route(
            "/items/{kind}/{item_id}/assignees/{user_id}",
            delete(delete_assignee),
        )
        .route("/cards/{card_id}", get(get_card).patch(patch_card))
        .route(
            "/cards/{card_id}/comments",
            post(post_comment).get(get_comments),
        )
        .route("/realtime/ws", get(realtime_ws));

    Ok(routes
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                ))
                .layer(governor_layer),
        ))
}

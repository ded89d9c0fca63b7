use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use corkboard_core::{BoardId, BoardName, BoardRole, UserId, WorkspaceId, WorkspaceName, WorkspaceRole};

use super::Actor;
use crate::server::{
    core::AppState,
    errors::ServiceError,
    membership::{
        add_board_member, add_workspace_member, create_board, create_workspace, describe_board,
        describe_workspace, register_user, remove_board_member, remove_workspace_member,
        update_board_member_role, update_workspace_member_role,
    },
    types::{
        AddMemberRequest, BoardDetailResponse, BoardMemberPath, BoardPath, BoardResponse,
        CreateBoardRequest, CreateWorkspaceRequest, MemberResponse, UpdateMemberRoleRequest,
        UserResponse, WorkspaceDetailResponse, WorkspaceMemberPath, WorkspacePath,
        WorkspaceResponse,
    },
};

pub(crate) async fn create_user(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<UserResponse>), ServiceError> {
    let user = register_user(&state.store).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user_id: user.to_string(),
        }),
    ))
}

pub(crate) async fn post_workspace(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<WorkspaceResponse>), ServiceError> {
    let name = WorkspaceName::try_from(payload.name)?;
    let workspace = create_workspace(&state.store, &state.hub, actor, name).await?;
    Ok((
        StatusCode::CREATED,
        Json(WorkspaceResponse {
            workspace_id: workspace.to_string(),
        }),
    ))
}

pub(crate) async fn get_workspace(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<WorkspacePath>,
) -> Result<Json<WorkspaceDetailResponse>, ServiceError> {
    let workspace: WorkspaceId = path.workspace_id.parse()?;
    let view = describe_workspace(&state.store, actor, workspace).await?;
    Ok(Json(WorkspaceDetailResponse {
        workspace_id: workspace.to_string(),
        name: view.name,
        boards: view.boards.iter().map(ToString::to_string).collect(),
        members: view
            .members
            .into_iter()
            .map(|(user, role)| MemberResponse {
                user_id: user.to_string(),
                role: role.as_str(),
            })
            .collect(),
    }))
}

pub(crate) async fn post_board(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<WorkspacePath>,
    Json(payload): Json<CreateBoardRequest>,
) -> Result<(StatusCode, Json<BoardResponse>), ServiceError> {
    let workspace: WorkspaceId = path.workspace_id.parse()?;
    let name = BoardName::try_from(payload.name)?;
    let board = create_board(&state.store, &state.hub, actor, workspace, name).await?;
    Ok((
        StatusCode::CREATED,
        Json(BoardResponse {
            board_id: board.to_string(),
        }),
    ))
}

pub(crate) async fn get_board(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<BoardPath>,
) -> Result<Json<BoardDetailResponse>, ServiceError> {
    let board: BoardId = path.board_id.parse()?;
    let view = describe_board(&state.store, actor, board).await?;
    Ok(Json(BoardDetailResponse {
        board_id: board.to_string(),
        workspace_id: view.workspace.to_string(),
        name: view.name,
        members: view
            .members
            .into_iter()
            .map(|(user, role)| MemberResponse {
                user_id: user.to_string(),
                role: role.as_str(),
            })
            .collect(),
        lists: view.lists,
    }))
}

pub(crate) async fn post_workspace_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<WorkspacePath>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ServiceError> {
    let workspace: WorkspaceId = path.workspace_id.parse()?;
    let user: UserId = payload.user_id.parse()?;
    let role = WorkspaceRole::try_from(payload.role)?;
    add_workspace_member(&state.store, &state.hub, actor, workspace, user, role).await?;
    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            user_id: user.to_string(),
            role: role.as_str(),
        }),
    ))
}

pub(crate) async fn patch_workspace_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<WorkspaceMemberPath>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> Result<Json<MemberResponse>, ServiceError> {
    let workspace: WorkspaceId = path.workspace_id.parse()?;
    let target: UserId = path.user_id.parse()?;
    let role = WorkspaceRole::try_from(payload.role)?;
    update_workspace_member_role(&state.store, &state.hub, actor, workspace, target, role).await?;
    Ok(Json(MemberResponse {
        user_id: target.to_string(),
        role: role.as_str(),
    }))
}

pub(crate) async fn delete_workspace_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<WorkspaceMemberPath>,
) -> Result<StatusCode, ServiceError> {
    let workspace: WorkspaceId = path.workspace_id.parse()?;
    let target: UserId = path.user_id.parse()?;
    remove_workspace_member(&state.store, &state.hub, actor, workspace, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn post_board_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<BoardPath>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ServiceError> {
    let board: BoardId = path.board_id.parse()?;
    let user: UserId = payload.user_id.parse()?;
    let role = BoardRole::try_from(payload.role)?;
    add_board_member(&state.store, &state.hub, actor, board, user, role).await?;
    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            user_id: user.to_string(),
            role: role.as_str(),
        }),
    ))
}

pub(crate) async fn patch_board_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<BoardMemberPath>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> Result<Json<MemberResponse>, ServiceError> {
    let board: BoardId = path.board_id.parse()?;
    let target: UserId = path.user_id.parse()?;
    let role = BoardRole::try_from(payload.role)?;
    update_board_member_role(&state.store, &state.hub, actor, board, target, role).await?;
    Ok(Json(MemberResponse {
        user_id: target.to_string(),
        role: role.as_str(),
    }))
}

pub(crate) async fn delete_board_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(path): Path<BoardMemberPath>,
) -> Result<StatusCode, ServiceError> {
    let board: BoardId = path.board_id.parse()?;
    let target: UserId = path.user_id.parse()?;
    remove_board_member(&state.store, &state.hub, actor, board, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

// 目录浏览与增删改移

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use tracing::info;

use super::run_blocking;
use crate::filesystem::{
    CreateFolderRequest, DeleteRequest, DeleteResponse, ListQuery, ListResponse, MoveRequest,
    MoveResponse, RenameRequest, SuccessResponse,
};
use crate::server::error::ApiResult;
use crate::server::state::AppState;

/// GET /list?drive=DATA&path=docs
pub async fn list_directory(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(query) = query?;

    let listing = run_blocking(&state, move |s| {
        let root = s.roots.select(query.drive.as_deref())?;
        s.fs.list_directory(&root, &query.path)
    })
    .await?;

    Ok(Json(listing))
}

/// POST /create_folder
pub async fn create_folder(
    State(state): State<AppState>,
    payload: Result<Json<CreateFolderRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(req) = payload?;
    info!("API: 新建文件夹 path={:?}, name={:?}", req.path, req.folder_name);

    run_blocking(&state, move |s| {
        let root = s.roots.select(req.drive.as_deref())?;
        s.fs.create_folder(&root.base, &req.path, &req.folder_name)
    })
    .await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /rename
pub async fn rename_entry(
    State(state): State<AppState>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(req) = payload?;
    info!("API: 重命名 {:?} -> {:?}", req.old_path, req.new_name);

    run_blocking(&state, move |s| {
        let root = s.roots.select(req.drive.as_deref())?;
        s.fs.rename(&root.base, &req.old_path, &req.new_name)
    })
    .await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /delete
pub async fn delete_entries(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Json(req) = payload?;
    info!("API: 删除 {} 项 (当前目录 {:?})", req.selected.len(), req.path);

    let deleted = run_blocking(&state, move |s| {
        let root = s.roots.select(req.drive.as_deref())?;
        s.fs.delete(&root.base, &req.selected)
    })
    .await?;

    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}

/// POST /move
pub async fn move_entries(
    State(state): State<AppState>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> ApiResult<Json<MoveResponse>> {
    let Json(req) = payload?;
    info!(
        "API: 移动 {} 项 {:?} -> {:?}",
        req.selected.len(),
        req.path,
        req.target_path
    );

    let moved = run_blocking(&state, move |s| {
        let root = s.roots.select(req.drive.as_deref())?;
        s.fs.move_entries(&root.base, &req.target_path, &req.selected)
    })
    .await?;

    Ok(Json(MoveResponse {
        success: true,
        moved,
    }))
}

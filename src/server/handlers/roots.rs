// 根列表与健康检查

use axum::{extract::State, Json};
use serde::Serialize;

use super::run_blocking;
use crate::filesystem::RootInfo;
use crate::server::error::ApiResult;
use crate::server::state::AppState;

/// GET /roots
/// 可选择的根（数据目录 + 当前挂载的卷）
pub async fn list_roots(State(state): State<AppState>) -> ApiResult<Json<Vec<RootInfo>>> {
    let roots = run_blocking(&state, |s| Ok(s.roots.list_roots())).await?;
    Ok(Json(roots))
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
    })
}

// Web服务器模块

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::path::PathBuf;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::ServerConfig;

/// 构建完整路由
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/list", get(handlers::list_directory))
        .route("/roots", get(handlers::list_roots))
        .route("/health", get(handlers::health_check))
        .route("/upload", post(handlers::upload_files))
        .route("/create_folder", post(handlers::create_folder))
        .route("/rename", post(handlers::rename_entry))
        .route("/delete", post(handlers::delete_entries))
        .route("/move", post(handlers::move_entries))
        .route("/download", get(handlers::download_file))
        .route("/preview", get(handlers::preview_file))
        .layer(DefaultBodyLimit::max(config.upload.max_request_bytes))
        .with_state(state);

    // 前端是可选的外部资源
    let app = match detect_frontend_dir(&config.server) {
        Some(dir) => {
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(&dir).not_found_service(ServeFile::new(index)))
        }
        None => api,
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server.cors_origins)),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("忽略无效的 CORS 源: {:?}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// 查找前端资源目录
///
/// 配置中指定的目录优先，其次依次尝试 ./frontend/dist、./frontend、./static、
/// /app/frontend，以及可执行文件旁的 frontend、static。
/// 只接受包含 index.html 的目录
pub fn detect_frontend_dir(config: &ServerConfig) -> Option<PathBuf> {
    if let Some(dir) = &config.frontend_dir {
        if dir.join("index.html").is_file() {
            return Some(dir.clone());
        }
        tracing::warn!("配置的前端目录无效（缺少 index.html）: {:?}", dir);
        return None;
    }

    let mut candidates = vec![
        PathBuf::from("./frontend/dist"),
        PathBuf::from("./frontend"),
        PathBuf::from("./static"),
        PathBuf::from("/app/frontend"),
    ];
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    {
        candidates.push(exe_dir.join("frontend"));
        candidates.push(exe_dir.join("static"));
    }

    let found = candidates
        .into_iter()
        .find(|dir| dir.join("index.html").is_file());

    match &found {
        Some(dir) => info!("✓ 找到前端资源目录: {:?}", dir),
        None => info!("未找到前端资源目录，仅提供 API"),
    }
    found
}

// API 错误
//
// 所有失败响应统一为 `{"error": "..."}`

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::filesystem::{FsError, FsErrorCode};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    MultipartRejected(#[from] MultipartRejection),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("后台任务失败: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::Fs(e) => {
                let status =
                    StatusCode::from_u16(e.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!("文件操作失败: {}", e);
                } else {
                    tracing::debug!("请求被拒绝: {}", e);
                }
                // 越界请求只返回通用提示
                let message = match e.code {
                    FsErrorCode::AccessDenied => e.code.message().to_string(),
                    _ => e.message,
                };
                (status, message)
            }
            ApiError::Json(e) => (e.status(), e.body_text()),
            ApiError::Query(e) => (e.status(), e.body_text()),
            ApiError::MultipartRejected(e) => (e.status(), e.body_text()),
            ApiError::Multipart(e) => (e.status(), e.body_text()),
            ApiError::Join(e) => {
                tracing::error!("后台任务失败: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "服务器内部错误".to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!("服务器内部错误: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorResponse { error })).into_response()
    }
}

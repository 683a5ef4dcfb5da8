// 上传、下载与预览

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;
use tracing::info;

use super::run_blocking;
use crate::filesystem::{FileQuery, FsError, PreviewResponse, UploadResponse, UploadedFile};
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;

/// POST /upload (multipart: drive, path, files[])
///
/// 所有文件字段都视为上传文件，空文件名（未选择文件的输入框）忽略
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;

    let mut drive: Option<String> = None;
    let mut path = String::new();
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if let Some(filename) = field.file_name().map(str::to_string) {
            let content = field.bytes().await?;
            if !filename.is_empty() {
                files.push(UploadedFile {
                    filename,
                    content: content.to_vec(),
                });
            }
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "drive" => drive = Some(field.text().await?),
            "path" => path = field.text().await?,
            _ => {}
        }
    }

    info!("API: 上传 {} 个文件到 {:?}", files.len(), path);

    let saved = run_blocking(&state, move |s| {
        let root = s.roots.select(drive.as_deref())?;
        s.fs.save_uploads(&root.base, &path, files)
    })
    .await?;

    Ok(Json(UploadResponse {
        success: true,
        saved,
    }))
}

/// GET /download?drive=DATA&filename=docs/report.pdf
pub async fn download_file(
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;

    let handle = run_blocking(&state, move |s| {
        let root = s.roots.select(query.drive.as_deref())?;
        s.fs.open_file(&root.base, &query.filename)
    })
    .await?;

    let file = tokio::fs::File::open(handle.path.as_path())
        .await
        .map_err(|e| FsError::from_io(&e, handle.path.as_path()))?;

    let mime = mime_guess::from_path(handle.path.as_path()).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(handle.size));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&content_disposition(&handle.name))?,
    );

    info!("下载文件: {} ({} 字节)", handle.path.relative(), handle.size);
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

/// GET /preview?drive=DATA&filename=photos/a.jpg
pub async fn preview_file(
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<Json<PreviewResponse>> {
    let Query(query) = query?;

    let preview = run_blocking(&state, move |s| {
        let root = s.roots.select(query.drive.as_deref())?;
        s.fs.preview(&root.base, &query.filename)
    })
    .await?;

    Ok(Json(preview))
}

fn header_value(value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ApiError::Internal("响应头构建失败".to_string()))
}

/// `attachment; filename="ascii"; filename*=UTF-8''percent-encoded`
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );

        let value = content_disposition("报告 \"final\".pdf");
        assert!(value.starts_with("attachment; filename=\"__ _final_.pdf\""));
        assert!(value.contains("filename*=UTF-8''%E6%8A%A5%E5%91%8A%20%22final%22.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}

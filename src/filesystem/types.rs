// 文件系统模块数据类型定义

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::FilesystemConfig;

/// 文件系统错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorCode {
    /// 路径越界（穿越、符号链接逃逸、非法根）
    AccessDenied,
    /// 文件或目录不存在
    NotFound,
    /// 目标已存在
    Conflict,
    /// 名称为空或非法
    InvalidName,
    /// 上传批次中没有可保存的文件
    NoValidFiles,
    /// 缺少移动目标
    MissingTarget,
    /// 指定路径不是目录
    NotADirectory,
    /// 文件超过预览大小上限
    PreviewTooLarge,
    /// 宿主文件系统拒绝访问
    PermissionDenied,
    /// 其他 I/O 错误
    Io,
}

impl FsErrorCode {
    /// 默认的客户端可见消息
    pub fn message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "访问被拒绝",
            Self::NotFound => "文件或文件夹不存在",
            Self::Conflict => "已存在同名项目",
            Self::InvalidName => "名称无效",
            Self::NoValidFiles => "没有可上传的有效文件",
            Self::MissingTarget => "目标路径无效",
            Self::NotADirectory => "指定路径不是目录",
            Self::PreviewTooLarge => "文件过大，无法预览",
            Self::PermissionDenied => "没有权限访问该路径",
            Self::Io => "文件系统操作失败",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status(&self) -> u16 {
        match self {
            Self::AccessDenied => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InvalidName
            | Self::NoValidFiles
            | Self::MissingTarget
            | Self::NotADirectory
            | Self::PreviewTooLarge => 400,
            Self::PermissionDenied | Self::Io => 500,
        }
    }
}

/// 文件系统错误
///
/// `path` 只用于服务端日志，不会返回给客户端
#[derive(Debug)]
pub struct FsError {
    pub code: FsErrorCode,
    pub message: String,
    pub path: Option<String>,
}

impl FsError {
    pub fn new(code: FsErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// 将 I/O 错误映射为文件系统错误
    ///
    /// NotFound 使用通用消息，其余错误附带底层错误信息
    pub fn from_io(err: &std::io::Error, path: &Path) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory => {
                FsErrorCode::NotFound
            }
            std::io::ErrorKind::PermissionDenied => FsErrorCode::PermissionDenied,
            _ => FsErrorCode::Io,
        };

        let fs_err = Self::new(code).with_path(path.to_string_lossy().to_string());
        if code == FsErrorCode::NotFound {
            fs_err
        } else {
            let message = format!("{}: {}", code.message(), err);
            fs_err.with_message(message)
        }
    }
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref path) = self.path {
            write!(f, "{}: {}", self.message, path)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for FsError {}

/// 可内联预览的媒体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Video,
}

impl PreviewKind {
    /// 根据扩展名判断是否可预览
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" => Some(Self::Image),
            "mp4" | "avi" | "mov" | "mkv" => Some(Self::Video),
            _ => None,
        }
    }
}

/// 目录列表中的一个条目
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// 文件名
    pub name: String,
    /// 是否为目录
    pub is_dir: bool,
    /// 文件大小（目录为 None）
    pub size: Option<u64>,
    /// 修改时间 (ISO8601)
    pub modified: String,
    /// 相对根的路径，始终使用 `/` 分隔
    pub path: String,
    /// 预览提示
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewKind>,
}

/// 根类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// 应用数据目录
    DataDir,
    /// 探测到的磁盘卷
    Volume,
}

/// 一个可供选择的根
#[derive(Debug, Clone, Serialize)]
pub struct RootInfo {
    /// 客户端使用的标识
    pub token: String,
    /// 显示名称
    pub label: String,
    pub kind: RootKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_bytes: Option<u64>,
}

/// 列目录请求参数
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub drive: Option<String>,
    #[serde(default)]
    pub path: String,
}

/// 列目录响应
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// 实际使用的根标识（非法标识回退后的值）
    pub root: String,
    /// 规范化后的当前路径
    pub path: String,
    /// 父目录路径（位于根时为 None）
    pub parent: Option<String>,
    pub entries: Vec<Entry>,
}

/// 新建文件夹请求
#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub drive: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub folder_name: String,
}

/// 重命名请求
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub drive: Option<String>,
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_name: String,
}

/// 批量删除请求
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub drive: Option<String>,
    /// 当前浏览目录，仅用于日志
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub selected: Vec<String>,
}

/// 批量移动请求
#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub drive: Option<String>,
    /// 当前浏览目录，仅用于日志
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub selected: Vec<String>,
}

/// 下载 / 预览请求参数
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub drive: Option<String>,
    #[serde(default)]
    pub filename: String,
}

/// 上传的单个文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// 客户端提交的原始文件名
    pub filename: String,
    pub content: Vec<u8>,
}

/// 通用成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// 上传响应
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub saved: usize,
}

/// 删除响应
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: usize,
}

/// 移动响应
#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub success: bool,
    pub moved: usize,
}

/// 预览响应
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub base64: String,
    pub mime: String,
}

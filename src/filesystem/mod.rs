// 本地文件管理模块
//
// 根选择、路径安全解析，以及列表/上传/下载/预览/增删改移等文件操作

mod guard;
pub mod roots;
mod sanitize;
mod segments;
mod service;
mod types;

pub use guard::{is_within, PathGuard, ResolvedPath};
pub use roots::{
    CachedVolumes, RootSelector, SelectedRoot, StaticVolumes, SystemVolumes, Volume, VolumeSource,
};
pub use sanitize::{extension_of, has_allowed_extension, sanitize_name};
pub use segments::RelativePath;
pub use service::{DirEntries, FileHandle, FilesystemService};
pub use types::*;

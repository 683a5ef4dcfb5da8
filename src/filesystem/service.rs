// 文件系统服务
//
// 目录列表和所有读写操作。每个操作先把所有路径参数交给 PathGuard 解析，再调用文件系统原语

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::guard::{is_within, PathGuard, ResolvedPath};
use super::roots::SelectedRoot;
use super::sanitize::{has_allowed_extension, sanitize_name};
use super::segments::RelativePath;
use super::types::*;

/// 可下载的文件
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub path: ResolvedPath,
    /// 下载时使用的文件名
    pub name: String,
    pub size: u64,
}

/// 文件系统服务
pub struct FilesystemService {
    guard: PathGuard,
    config: FilesystemConfig,
    allowed_extensions: Vec<String>,
}

impl FilesystemService {
    /// 创建新的文件系统服务
    pub fn new(config: FilesystemConfig, allowed_extensions: Vec<String>) -> Self {
        Self {
            guard: PathGuard::new(config.clone()),
            config,
            allowed_extensions,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// 列出目录内容
    pub fn list_directory(&self, root: &SelectedRoot, raw: &str) -> Result<ListResponse, FsError> {
        let dir = self.guard.resolve(&root.base, raw)?;

        let metadata = fs::metadata(dir.as_path()).map_err(|e| FsError::from_io(&e, dir.as_path()))?;
        if !metadata.is_dir() {
            return Err(FsError::new(FsErrorCode::NotADirectory).with_path(raw));
        }

        let mut entries: Vec<Entry> = self.read_entries(&dir)?.collect();
        sort_entries(&mut entries);

        Ok(ListResponse {
            root: root.token.clone(),
            path: dir.relative().to_string(),
            parent: dir.relative().parent().map(|p| p.to_string()),
            entries,
        })
    }

    /// 逐项读取目录
    pub fn read_entries<'a>(&'a self, dir: &'a ResolvedPath) -> Result<DirEntries<'a>, FsError> {
        let inner = fs::read_dir(dir.as_path()).map_err(|e| {
            tracing::error!("读取目录失败: {:?}, 错误: {}", dir.as_path(), e);
            FsError::from_io(&e, dir.as_path())
        })?;

        Ok(DirEntries {
            inner,
            dir,
            guard: &self.guard,
        })
    }

    /// 新建文件夹（已存在时视为成功）
    pub fn create_folder(
        &self,
        base: &Path,
        parent: &str,
        folder_name: &str,
    ) -> Result<ResolvedPath, FsError> {
        let parent = self.guard.resolve(base, parent)?;
        let name = sanitize_name(folder_name)
            .ok_or_else(|| FsError::new(FsErrorCode::InvalidName).with_path(folder_name))?;
        let target = self.guard.resolve_child(&parent, &name)?;

        if target.as_path().is_file() {
            return Err(FsError::new(FsErrorCode::Conflict)
                .with_path(target.as_path().to_string_lossy().to_string()));
        }

        fs::create_dir_all(target.as_path()).map_err(|e| {
            tracing::error!("创建文件夹失败: {:?}, 错误: {}", target.as_path(), e);
            FsError::from_io(&e, target.as_path())
        })?;

        tracing::info!("创建文件夹: {}", target.relative());
        Ok(target)
    }

    /// 重命名
    pub fn rename(&self, base: &Path, old_path: &str, new_name: &str) -> Result<ResolvedPath, FsError> {
        let source = self.guard.resolve(base, old_path)?;
        if source.is_root() {
            tracing::warn!("安全拦截: 尝试重命名根目录 base={:?}", source.base());
            return Err(FsError::new(FsErrorCode::AccessDenied).with_path(old_path));
        }

        if fs::symlink_metadata(source.as_path()).is_err() {
            return Err(FsError::new(FsErrorCode::NotFound).with_path(old_path));
        }

        let name = sanitize_name(new_name)
            .ok_or_else(|| FsError::new(FsErrorCode::InvalidName).with_path(new_name))?;
        let sibling = source
            .relative()
            .parent()
            .unwrap_or_else(RelativePath::root)
            .child(&name)?;
        let dest = self.guard.resolve_relative(source.base(), sibling)?;

        if fs::symlink_metadata(dest.as_path()).is_ok() {
            return Err(FsError::new(FsErrorCode::Conflict).with_path(dest.relative().to_string()));
        }

        fs::rename(source.as_path(), dest.as_path()).map_err(|e| {
            tracing::error!(
                "重命名失败: {:?} -> {:?}, 错误: {}",
                source.as_path(),
                dest.as_path(),
                e
            );
            FsError::from_io(&e, source.as_path())
        })?;

        tracing::info!("重命名: {} -> {}", source.relative(), dest.relative());
        Ok(dest)
    }

    /// 批量删除，返回实际删除的数量
    ///
    /// 任一路径越界时整批拒绝；不存在的条目和单项 I/O 失败跳过
    pub fn delete(&self, base: &Path, selected: &[String]) -> Result<usize, FsError> {
        let targets = self.resolve_all(base, selected)?;
        let mut deleted = 0;

        for target in targets {
            if target.is_root() {
                tracing::warn!("跳过根目录删除请求: {:?}", target.base());
                continue;
            }

            let metadata = match fs::symlink_metadata(target.as_path()) {
                Ok(m) => m,
                Err(_) => {
                    tracing::debug!("删除时跳过不存在的条目: {}", target.relative());
                    continue;
                }
            };

            let result = if metadata.is_dir() {
                fs::remove_dir_all(target.as_path())
            } else {
                fs::remove_file(target.as_path())
            };

            match result {
                Ok(()) => {
                    tracing::info!("已删除: {}", target.relative());
                    deleted += 1;
                }
                Err(e) => {
                    tracing::warn!("删除失败: {:?}, 错误: {}", target.as_path(), e);
                }
            }
        }

        Ok(deleted)
    }

    /// 批量移动到目标目录，返回实际移动的数量
    ///
    /// 目标目录不存在时创建；源不存在、源与目标相同、目标已存在、目标位于源内部时跳过该项
    pub fn move_entries(
        &self,
        base: &Path,
        target_path: &str,
        selected: &[String],
    ) -> Result<usize, FsError> {
        if target_path.trim().is_empty() {
            return Err(FsError::new(FsErrorCode::MissingTarget));
        }

        let target = self.guard.resolve(base, target_path)?;
        let sources = self.resolve_all(base, selected)?;

        if target.as_path().exists() && !target.as_path().is_dir() {
            return Err(FsError::new(FsErrorCode::NotADirectory).with_path(target_path));
        }
        fs::create_dir_all(target.as_path()).map_err(|e| FsError::from_io(&e, target.as_path()))?;

        let mut moved = 0;
        for source in sources {
            let Some(name) = source.relative().file_name() else {
                tracing::warn!("跳过根目录移动请求: {:?}", source.base());
                continue;
            };

            if fs::symlink_metadata(source.as_path()).is_err() {
                tracing::debug!("移动时跳过不存在的条目: {}", source.relative());
                continue;
            }

            let dest = match self.guard.resolve_child(&target, name) {
                Ok(dest) => dest,
                Err(e) => {
                    tracing::warn!("移动目标无效: {}/{}, 错误: {}", target.relative(), name, e);
                    continue;
                }
            };

            if dest.as_path() == source.as_path() {
                continue;
            }
            if fs::symlink_metadata(dest.as_path()).is_ok() {
                tracing::info!("目标已存在，跳过: {}", dest.relative());
                continue;
            }
            if is_within(dest.as_path(), source.as_path()) {
                tracing::warn!("不能把目录移动到其自身内部: {}", source.relative());
                continue;
            }

            match move_path(source.as_path(), dest.as_path()) {
                Ok(()) => {
                    tracing::info!("已移动: {} -> {}", source.relative(), dest.relative());
                    moved += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "移动失败: {:?} -> {:?}, 错误: {}",
                        source.as_path(),
                        dest.as_path(),
                        e
                    );
                }
            }
        }

        Ok(moved)
    }

    /// 保存上传的文件，返回保存成功的数量
    pub fn save_uploads(
        &self,
        base: &Path,
        target_path: &str,
        files: Vec<UploadedFile>,
    ) -> Result<usize, FsError> {
        let target = self.guard.resolve(base, target_path)?;

        if files.is_empty() {
            return Err(FsError::new(FsErrorCode::NoValidFiles));
        }

        let accepted: Vec<(String, Vec<u8>)> = files
            .into_iter()
            .filter_map(|file| {
                if !has_allowed_extension(&file.filename, &self.allowed_extensions) {
                    tracing::debug!("跳过不允许的文件类型: {}", file.filename);
                    return None;
                }
                let name = sanitize_name(&file.filename)
                    .filter(|n| has_allowed_extension(n, &self.allowed_extensions))?;
                Some((name, file.content))
            })
            .collect();

        if accepted.is_empty() {
            return Err(FsError::new(FsErrorCode::NoValidFiles));
        }

        if target.as_path().exists() && !target.as_path().is_dir() {
            return Err(FsError::new(FsErrorCode::NotADirectory).with_path(target_path));
        }
        fs::create_dir_all(target.as_path()).map_err(|e| FsError::from_io(&e, target.as_path()))?;

        let mut saved = 0;
        let mut last_error: Option<FsError> = None;

        for (name, content) in accepted {
            let dest = match self.guard.resolve_child(&target, &name) {
                Ok(dest) => dest,
                Err(e) => {
                    tracing::warn!("上传目标无效: {}/{}, 错误: {}", target.relative(), name, e);
                    last_error = Some(e);
                    continue;
                }
            };

            match fs::write(dest.as_path(), &content) {
                Ok(()) => {
                    tracing::info!("已保存上传文件: {} ({} 字节)", dest.relative(), content.len());
                    saved += 1;
                }
                Err(e) => {
                    tracing::error!("保存上传文件失败: {:?}, 错误: {}", dest.as_path(), e);
                    last_error = Some(FsError::from_io(&e, dest.as_path()));
                }
            }
        }

        match (saved, last_error) {
            (0, Some(err)) => Err(err),
            _ => Ok(saved),
        }
    }

    /// 打开待下载的文件（目录或不存在返回 NotFound）
    pub fn open_file(&self, base: &Path, raw: &str) -> Result<FileHandle, FsError> {
        let path = self.guard.resolve(base, raw)?;

        let metadata = match fs::metadata(path.as_path()) {
            Ok(m) if m.is_file() => m,
            _ => return Err(FsError::new(FsErrorCode::NotFound).with_path(raw)),
        };

        let name = path
            .relative()
            .file_name()
            .map(str::to_string)
            .or_else(|| {
                path.as_path()
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "download".to_string());

        Ok(FileHandle {
            name,
            size: metadata.len(),
            path,
        })
    }

    /// 读取文件并编码为 base64 用于内联预览
    ///
    /// 先用元数据检查大小，超过上限时不读取内容
    pub fn preview(&self, base: &Path, raw: &str) -> Result<PreviewResponse, FsError> {
        let file = self.open_file(base, raw)?;

        if file.size > self.config.preview_max_bytes {
            tracing::info!(
                "预览文件过大: {} ({} 字节, 上限 {} 字节)",
                file.path.relative(),
                file.size,
                self.config.preview_max_bytes
            );
            return Err(FsError::new(FsErrorCode::PreviewTooLarge)
                .with_message(format!(
                    "{} (上限 {} MB)",
                    FsErrorCode::PreviewTooLarge.message(),
                    self.config.preview_max_bytes / (1024 * 1024)
                ))
                .with_path(raw));
        }

        let content = fs::read(file.path.as_path()).map_err(|e| {
            tracing::error!("读取预览文件失败: {:?}, 错误: {}", file.path.as_path(), e);
            FsError::from_io(&e, file.path.as_path())
        })?;

        let mime = mime_guess::from_path(file.path.as_path())
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(PreviewResponse {
            base64: STANDARD.encode(content),
            mime,
        })
    }

    /// 解析批量操作的所有路径
    ///
    /// 任一路径越界时整批拒绝；其他解析错误只跳过该项
    fn resolve_all(&self, base: &Path, selected: &[String]) -> Result<Vec<ResolvedPath>, FsError> {
        let mut resolved = Vec::with_capacity(selected.len());
        for raw in selected {
            match self.guard.resolve(base, raw) {
                Ok(path) => resolved.push(path),
                Err(e) if e.code == FsErrorCode::AccessDenied => return Err(e),
                Err(e) => tracing::warn!("批量操作跳过无法解析的条目: {:?}, 错误: {}", raw, e),
            }
        }
        Ok(resolved)
    }
}

/// 目录条目迭代器
///
/// 读取失败的条目记录警告后跳过，不会终止迭代
pub struct DirEntries<'a> {
    inner: fs::ReadDir,
    dir: &'a ResolvedPath,
    guard: &'a PathGuard,
}

impl Iterator for DirEntries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let item = self.inner.next()?;
            match item.and_then(|e| self.to_entry(&e)) {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("跳过无法读取的条目: {:?}, 错误: {}", self.dir.as_path(), e);
                    continue;
                }
            }
        }
    }
}

impl DirEntries<'_> {
    fn to_entry(&self, dir_entry: &fs::DirEntry) -> io::Result<Option<Entry>> {
        let name = dir_entry.file_name().to_string_lossy().to_string();
        if self.guard.is_hidden(&name) {
            return Ok(None);
        }

        // 跟随符号链接，悬空链接在这里失败并被跳过
        let entry_path = dir_entry.path();
        let metadata = fs::metadata(&entry_path)?;
        let is_dir = metadata.is_dir();

        let path = if self.dir.relative().is_root() {
            name.clone()
        } else {
            format!("{}/{}", self.dir.relative(), name)
        };

        Ok(Some(Entry {
            size: if is_dir { None } else { Some(metadata.len()) },
            modified: metadata
                .modified()
                .ok()
                .map(system_time_to_iso8601)
                .unwrap_or_default(),
            preview: if is_dir {
                None
            } else {
                PreviewKind::detect(&entry_path)
            },
            name,
            is_dir,
            path,
        }))
    }
}

/// 目录在前，然后按名称（不区分大小写）
fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn system_time_to_iso8601(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339()
}

/// 移动文件或目录，rename 失败（如跨设备）时退化为复制后删除
fn move_path(source: &Path, dest: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(source, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::debug!("rename 失败，改为复制: {:?}, 错误: {}", source, rename_err);

    let metadata = fs::symlink_metadata(source)?;
    if metadata.is_dir() {
        if let Err(e) = copy_tree(source, dest) {
            // 复制不完整，保留源目录
            let _ = fs::remove_dir_all(dest);
            return Err(e);
        }
        fs::remove_dir_all(source)
    } else if metadata.is_file() {
        fs::copy(source, dest)?;
        fs::remove_file(source)
    } else {
        Err(rename_err)
    }
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("不支持跨设备移动符号链接: {:?}", entry.path()),
            ));
        }
    }
    Ok(())
}

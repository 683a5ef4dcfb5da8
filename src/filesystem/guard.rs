// 路径安全守卫
//
// 所有文件系统操作拿到的路径都必须经过这里的解析与边界检查，防止路径穿越和符号链接逃逸

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::segments::RelativePath;
use super::types::{FilesystemConfig, FsError, FsErrorCode};

/// 已通过边界检查的路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// 规范化后的根路径
    base: PathBuf,
    /// 客户端视角的相对路径
    relative: RelativePath,
    /// 规范化后的绝对路径（已解析符号链接）
    path: PathBuf,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn relative(&self) -> &RelativePath {
        &self.relative
    }

    /// 是否就是根本身
    pub fn is_root(&self) -> bool {
        self.path == self.base
    }
}

/// 路径安全守卫
#[derive(Debug, Clone)]
pub struct PathGuard {
    config: FilesystemConfig,
}

impl PathGuard {
    /// 创建新的路径守卫
    pub fn new(config: FilesystemConfig) -> Self {
        Self { config }
    }

    /// 解析客户端提交的相对路径
    ///
    /// 1. 规范化根路径
    /// 2. 按分段拼接并折叠 `.`/`..`
    /// 3. 解析符号链接
    /// 4. 按路径组件做前缀检查
    pub fn resolve(&self, base: &Path, raw: &str) -> Result<ResolvedPath, FsError> {
        let relative = RelativePath::parse(raw).map_err(|e| {
            tracing::warn!(
                "安全拦截: 路径穿越 base={:?}, requested={:?}",
                base,
                raw
            );
            e
        })?;
        self.resolve_relative(base, relative)
    }

    /// 解析已经分段的相对路径
    pub fn resolve_relative(
        &self,
        base: &Path,
        relative: RelativePath,
    ) -> Result<ResolvedPath, FsError> {
        let canonical_base = dunce::canonicalize(base).map_err(|e| {
            tracing::error!("根路径不可用: {:?}, 错误: {}", base, e);
            FsError::from_io(&e, base)
        })?;

        let joined = relative.join_to(&canonical_base);
        let resolved = canonicalize_lenient(&joined).map_err(|e| {
            if e.code == FsErrorCode::AccessDenied {
                tracing::warn!(
                    "安全拦截: 悬空符号链接 base={:?}, requested={:?}, joined={:?}",
                    canonical_base,
                    relative.to_string(),
                    joined
                );
            }
            e
        })?;

        if !is_within(&resolved, &canonical_base) {
            tracing::warn!(
                "安全拦截: 路径越界 base={:?}, requested={:?}, resolved={:?}",
                canonical_base,
                relative.to_string(),
                resolved
            );
            return Err(FsError::new(FsErrorCode::AccessDenied)
                .with_path(resolved.to_string_lossy().to_string()));
        }

        Ok(ResolvedPath {
            base: canonical_base,
            relative,
            path: resolved,
        })
    }

    /// 解析某个已验证目录下的子项
    ///
    /// `name` 必须是单个文件名（调用方应先清理）
    pub fn resolve_child(&self, parent: &ResolvedPath, name: &str) -> Result<ResolvedPath, FsError> {
        let relative = parent.relative.child(name)?;
        self.resolve_relative(&parent.base, relative)
    }

    /// 检查是否为需要隐藏的文件
    pub fn is_hidden(&self, name: &str) -> bool {
        !self.config.show_hidden && name.starts_with('.')
    }
}

/// 按路径组件判断 `path` 是否等于 `base` 或位于其下
///
/// `/data/app-evil` 不属于 `/data/app`
pub fn is_within(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

/// 规范化路径，允许末尾若干段尚不存在
///
/// 取最长的已存在前缀做 canonicalize，再把缺失的普通文件名追加回去；
/// 缺失段中如果存在悬空符号链接，视为越界
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, FsError> {
    match dunce::canonicalize(path) {
        Ok(p) => return Ok(p),
        Err(e) if is_missing(&e) => {}
        Err(e) => return Err(FsError::from_io(&e, path)),
    }

    let mut missing: Vec<OsString> = Vec::new();
    let mut current = path.to_path_buf();

    loop {
        // 能 lstat 却无法 canonicalize，说明这一段是指向不存在目标的符号链接
        if current.symlink_metadata().is_ok() {
            return Err(FsError::new(FsErrorCode::AccessDenied)
                .with_path(current.to_string_lossy().to_string()));
        }

        match current.file_name() {
            Some(name) => missing.push(name.to_os_string()),
            None => {
                return Err(FsError::new(FsErrorCode::NotFound)
                    .with_path(path.to_string_lossy().to_string()))
            }
        }

        if !current.pop() {
            return Err(FsError::new(FsErrorCode::NotFound)
                .with_path(path.to_string_lossy().to_string()));
        }

        match dunce::canonicalize(&current) {
            Ok(existing) => {
                let mut resolved = existing;
                for name in missing.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if is_missing(&e) => continue,
            Err(e) => return Err(FsError::from_io(&e, &current)),
        }
    }
}

/// 路径不存在，或者中间某段是普通文件
fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard() -> PathGuard {
        PathGuard::new(FilesystemConfig::default())
    }

    /// 创建 base/docs/report.pdf
    fn setup() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("data");
        fs::create_dir_all(base.join("docs")).unwrap();
        fs::write(base.join("docs").join("report.pdf"), b"pdf").unwrap();
        (temp, base)
    }

    #[test]
    fn test_resolve_existing_file() {
        let (_temp, base) = setup();
        let resolved = guard().resolve(&base, "docs/report.pdf").unwrap();

        let canonical_base = dunce::canonicalize(&base).unwrap();
        assert_eq!(
            resolved.as_path(),
            canonical_base.join("docs").join("report.pdf")
        );
        assert_eq!(resolved.relative().to_string(), "docs/report.pdf");
        assert!(!resolved.is_root());
    }

    #[test]
    fn test_resolve_empty_is_root() {
        let (_temp, base) = setup();
        for raw in ["", "/", "\\", "docs/.."] {
            let resolved = guard().resolve(&base, raw).unwrap();
            assert!(resolved.is_root(), "{:?} 应该解析为根", raw);
        }
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let (_temp, base) = setup();
        for raw in ["..", "../", "docs/../../etc/passwd", "..\\..\\secret", "/../x"] {
            let err = guard().resolve(&base, raw).unwrap_err();
            assert_eq!(err.code, FsErrorCode::AccessDenied, "{:?} 应该被拒绝", raw);
        }
    }

    #[test]
    fn test_resolve_missing_tail() {
        let (_temp, base) = setup();
        let resolved = guard().resolve(&base, "docs/new/deeper").unwrap();

        let canonical_base = dunce::canonicalize(&base).unwrap();
        assert_eq!(
            resolved.as_path(),
            canonical_base.join("docs").join("new").join("deeper")
        );
        assert!(!resolved.as_path().exists());
    }

    #[test]
    fn test_resolve_through_regular_file() {
        let (_temp, base) = setup();
        let resolved = guard().resolve(&base, "docs/report.pdf/ghost").unwrap();

        let canonical_base = dunce::canonicalize(&base).unwrap();
        assert_eq!(
            resolved.as_path(),
            canonical_base.join("docs").join("report.pdf").join("ghost")
        );
        assert!(fs::symlink_metadata(resolved.as_path()).is_err());
    }

    #[test]
    fn test_resolve_missing_base() {
        let temp = TempDir::new().unwrap();
        let err = guard()
            .resolve(&temp.path().join("unmounted"), "x")
            .unwrap_err();
        assert_eq!(err.code, FsErrorCode::NotFound);
    }

    #[test]
    fn test_is_within_is_segment_aware() {
        assert!(is_within(Path::new("/data/app"), Path::new("/data/app")));
        assert!(is_within(Path::new("/data/app/x"), Path::new("/data/app")));
        assert!(!is_within(Path::new("/data/app-evil"), Path::new("/data/app")));
        assert!(!is_within(Path::new("/data/app2/x"), Path::new("/data/app")));
        assert!(!is_within(Path::new("/data"), Path::new("/data/app")));
    }

    #[test]
    fn test_resolve_child() {
        let (_temp, base) = setup();
        let docs = guard().resolve(&base, "docs").unwrap();
        let child = guard().resolve_child(&docs, "new.txt").unwrap();
        assert_eq!(child.as_path(), docs.as_path().join("new.txt"));
        assert_eq!(child.relative().to_string(), "docs/new.txt");

        let err = guard().resolve_child(&docs, "..").unwrap_err();
        assert_eq!(err.code, FsErrorCode::InvalidName);
    }

    #[test]
    fn test_hidden_files() {
        let shown = guard();
        assert!(!shown.is_hidden(".bashrc"));

        let hidden = PathGuard::new(FilesystemConfig {
            show_hidden: false,
            ..Default::default()
        });
        assert!(hidden.is_hidden(".bashrc"));
        assert!(!hidden.is_hidden("normal.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let (temp, base) = setup();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.txt"), b"secret").unwrap();
        symlink(&outside, base.join("escape")).unwrap();

        // 纯文本规范化无法发现的逃逸
        let err = guard().resolve(&base, "escape/secret.txt").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);

        let err = guard().resolve(&base, "escape").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);

        // 指向外部的链接下尚不存在的路径同样拒绝
        let err = guard().resolve(&base, "escape/new_dir").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_prefix_sibling_rejected() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let base = temp.path().join("app");
        let sibling = temp.path().join("app2");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&sibling).unwrap();
        symlink(&sibling, base.join("link")).unwrap();

        let err = guard().resolve(&base, "link").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_base_allowed() {
        use std::os::unix::fs::symlink;

        let (_temp, base) = setup();
        symlink(base.join("docs"), base.join("alias")).unwrap();

        let resolved = guard().resolve(&base, "alias/report.pdf").unwrap();
        let canonical_base = dunce::canonicalize(&base).unwrap();
        assert_eq!(
            resolved.as_path(),
            canonical_base.join("docs").join("report.pdf")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        use std::os::unix::fs::symlink;

        let (temp, base) = setup();
        symlink(temp.path().join("not_yet"), base.join("dangling")).unwrap();

        let err = guard().resolve(&base, "dangling").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);

        let err = guard().resolve(&base, "dangling/child").unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);
    }

    fn segment() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("a"),
            Just("b"),
            Just("docs"),
            Just("."),
            Just(".."),
            Just(""),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolution_matches_lexical_depth(
            parts in proptest::collection::vec(segment(), 0..8),
            backslash in any::<bool>(),
        ) {
            let (_temp, base) = setup();
            let sep = if backslash { "\\" } else { "/" };
            let raw = parts.join(sep);

            // 计算字面深度，任何时刻为负即为越界
            let mut depth: i32 = 0;
            let mut escapes = false;
            for part in &parts {
                match *part {
                    ".." => {
                        depth -= 1;
                        if depth < 0 {
                            escapes = true;
                            break;
                        }
                    }
                    "" | "." => {}
                    _ => depth += 1,
                }
            }

            let result = guard().resolve(&base, &raw);
            if escapes {
                let err = result.unwrap_err();
                prop_assert_eq!(err.code, FsErrorCode::AccessDenied);
            } else {
                let resolved = result.unwrap();
                let canonical_base = dunce::canonicalize(&base).unwrap();
                prop_assert!(is_within(resolved.as_path(), &canonical_base));
            }
        }

        #[test]
        fn prop_prefix_sibling_never_within(suffix in "[a-z0-9_-]{1,8}") {
            let base = PathBuf::from("/data/app");
            let sibling = PathBuf::from(format!("/data/app{}", suffix));
            prop_assert!(!is_within(&sibling, &base));
            prop_assert!(is_within(&base.join(&suffix), &base));
        }
    }
}

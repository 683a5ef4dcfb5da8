// 相对路径分段表示
//
// 客户端提交的路径统一解析为有序的规范化分段，拼接、求父目录和越界判断都基于分段进行

use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::types::{FsError, FsErrorCode};

/// 相对某个根的路径（已规范化）
///
/// 不含空段、`.`、`..`，每一段都是宿主平台上的普通文件名
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// 根自身
    pub fn root() -> Self {
        Self::default()
    }

    /// 解析客户端提交的路径
    ///
    /// `/` 与 `\` 都视为分隔符，首尾分隔符无意义；
    /// `..` 向上越过根、或某段不是普通文件名（如盘符）时返回 AccessDenied
    pub fn parse(raw: &str) -> Result<Self, FsError> {
        let mut segments: Vec<String> = Vec::new();

        for part in raw.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(FsError::new(FsErrorCode::AccessDenied).with_path(raw));
                    }
                }
                name => {
                    if !is_plain_segment(name) {
                        return Err(FsError::new(FsErrorCode::AccessDenied).with_path(raw));
                    }
                    segments.push(name.to_string());
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// 父路径，根没有父路径
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// 最后一段
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// 追加一个文件名
    pub fn child(&self, name: &str) -> Result<Self, FsError> {
        if name.is_empty() || name == "." || name == ".." || !is_plain_segment(name) {
            return Err(FsError::new(FsErrorCode::InvalidName).with_path(name));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// 按分段拼接到基础路径之下
    pub fn join_to(&self, base: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// 判断是否为单个普通路径组件
fn is_plain_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// 根选择
//
// 客户端通过一个短标识选择要浏览的根：数据目录标识、盘符（如 "C:"）或挂载点路径。
// 标识必须对应当前真实存在的卷或数据目录，否则回退到数据目录（严格模式下直接拒绝）

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::Disks;

use super::guard::is_within;
use super::types::{FsError, FsErrorCode, RootInfo, RootKind};
use crate::config::StorageConfig;

/// 一个已挂载的存储卷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// 挂载点（Windows 上形如 `C:\`）
    pub mount_point: PathBuf,
    /// 设备或卷名
    pub name: String,
    pub total_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
}

impl Volume {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            name: String::new(),
            total_bytes: None,
            available_bytes: None,
        }
    }

    /// 客户端使用的标识：去掉末尾分隔符，`/` 保持原样
    pub fn token(&self) -> String {
        let raw = self.mount_point.to_string_lossy();
        let trimmed = raw.trim_end_matches(['/', '\\']);
        if trimmed.is_empty() {
            raw.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// 卷枚举
pub trait VolumeSource: Send + Sync {
    /// 返回当前可用的卷
    fn list_volumes(&self) -> Vec<Volume>;
}

/// 基于 sysinfo 的系统卷枚举
///
/// 排除光驱，以及无法读取根目录的卷（如没有放入介质的读卡器）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl VolumeSource for SystemVolumes {
    fn list_volumes(&self) -> Vec<Volume> {
        let disks = Disks::new_with_refreshed_list();
        let mut volumes: Vec<Volume> = Vec::new();

        for disk in disks.list() {
            let mount_point = disk.mount_point().to_path_buf();
            let fs_type = disk.file_system().to_string_lossy().to_lowercase();
            let name = disk.name().to_string_lossy().to_string();

            if mount_point.as_os_str().is_empty() || is_optical(&fs_type, &name) {
                continue;
            }

            if !is_accessible(&mount_point) {
                tracing::debug!("跳过不可访问的卷: {:?}", mount_point);
                continue;
            }

            if volumes.iter().any(|v| v.mount_point == mount_point) {
                continue;
            }

            volumes.push(Volume {
                mount_point,
                name,
                total_bytes: Some(disk.total_space()),
                available_bytes: Some(disk.available_space()),
            });
        }

        volumes
    }
}

/// 光驱判断
fn is_optical(fs_type: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    matches!(fs_type, "iso9660" | "udf" | "cdfs") || name.contains("cdrom")
}

/// 可访问性探测
fn is_accessible(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok()
}

/// 固定的卷列表
#[derive(Debug, Default, Clone)]
pub struct StaticVolumes(pub Vec<Volume>);

impl VolumeSource for StaticVolumes {
    fn list_volumes(&self) -> Vec<Volume> {
        self.0.clone()
    }
}

/// 带短时缓存的卷枚举
pub struct CachedVolumes<S> {
    inner: S,
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, Vec<Volume>)>>,
}

impl<S: VolumeSource> CachedVolumes<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshot: Mutex::new(None),
        }
    }
}

impl<S: VolumeSource> VolumeSource for CachedVolumes<S> {
    fn list_volumes(&self) -> Vec<Volume> {
        if self.ttl.is_zero() {
            return self.inner.list_volumes();
        }

        let mut snapshot = self.snapshot.lock();
        if let Some((taken_at, volumes)) = snapshot.as_ref() {
            if taken_at.elapsed() < self.ttl {
                return volumes.clone();
            }
        }

        let volumes = self.inner.list_volumes();
        *snapshot = Some((Instant::now(), volumes.clone()));
        volumes
    }
}

/// 选中的根
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRoot {
    /// 回显给客户端的标识
    pub token: String,
    /// 根目录路径（尚未规范化）
    pub base: PathBuf,
    pub kind: RootKind,
}

/// 数据目录根
#[derive(Debug, Clone)]
pub struct DataRoot {
    pub token: String,
    pub path: PathBuf,
}

impl DataRoot {
    fn selected(&self) -> SelectedRoot {
        SelectedRoot {
            token: self.token.clone(),
            base: self.path.clone(),
            kind: RootKind::DataDir,
        }
    }
}

/// 把盘符展开为卷根目录，其他标识原样作为候选路径
///
/// `"C:"` → `C:\`（Unix 上为 `C:/`）
pub fn candidate_path(token: &str) -> PathBuf {
    let mut chars = token.chars();
    if let (Some(letter), Some(':'), None) = (chars.next(), chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            return PathBuf::from(format!(
                "{}:{}",
                letter.to_ascii_uppercase(),
                MAIN_SEPARATOR
            ));
        }
    }
    PathBuf::from(token)
}

/// 在当前根集合中匹配标识
///
/// 纯函数：缺省标识或数据目录标识 → 数据目录；匹配到卷 → 该卷；否则 None
pub fn match_root(token: Option<&str>, data: &DataRoot, volumes: &[Volume]) -> Option<SelectedRoot> {
    let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
        None => return Some(data.selected()),
        Some(t) => t,
    };

    if token == data.token {
        return Some(data.selected());
    }

    let candidate = candidate_path(token);
    if let Some(volume) = volumes.iter().find(|v| v.mount_point == candidate) {
        return Some(SelectedRoot {
            token: volume.token(),
            base: volume.mount_point.clone(),
            kind: RootKind::Volume,
        });
    }

    if candidate == data.path {
        return Some(data.selected());
    }

    None
}

/// 根选择器
pub struct RootSelector {
    data: DataRoot,
    volumes: Arc<dyn VolumeSource>,
    strict: bool,
}

impl RootSelector {
    pub fn new(storage: &StorageConfig, volumes: Arc<dyn VolumeSource>) -> Self {
        Self {
            data: DataRoot {
                token: storage.data_root_token.clone(),
                path: storage.data_dir.clone(),
            },
            volumes,
            strict: storage.strict_root_selection,
        }
    }

    /// 使用系统卷枚举（带缓存）
    pub fn from_config(storage: &StorageConfig) -> Self {
        let volumes = CachedVolumes::new(
            SystemVolumes,
            Duration::from_secs(storage.volume_cache_secs),
        );
        Self::new(storage, Arc::new(volumes))
    }

    pub fn data_root(&self) -> SelectedRoot {
        self.data.selected()
    }

    /// 根据客户端标识选择根
    ///
    /// 未知标识默认静默回退到数据目录，严格模式下返回 AccessDenied
    pub fn select(&self, token: Option<&str>) -> Result<SelectedRoot, FsError> {
        let volumes = self.volumes.list_volumes();
        if let Some(selected) = match_root(token, &self.data, &volumes) {
            return Ok(selected);
        }

        let token = token.unwrap_or_default();
        if self.strict {
            tracing::warn!("拒绝未知的根标识: {:?}", token);
            return Err(FsError::new(FsErrorCode::AccessDenied).with_path(token));
        }

        tracing::warn!("未知的根标识 {:?}，回退到数据目录", token);
        Ok(self.data.selected())
    }

    /// 列出可选择的根，数据目录排在最前
    pub fn list_roots(&self) -> Vec<RootInfo> {
        let volumes = self.volumes.list_volumes();

        // 数据目录所在卷的容量信息
        let data_path = dunce::canonicalize(&self.data.path).unwrap_or_else(|_| self.data.path.clone());
        let host_volume = volumes
            .iter()
            .filter(|v| is_within(&data_path, &v.mount_point))
            .max_by_key(|v| v.mount_point.components().count());

        let mut roots = vec![RootInfo {
            token: self.data.token.clone(),
            label: format!("{} (本地数据)", self.data.token),
            kind: RootKind::DataDir,
            total_bytes: host_volume.and_then(|v| v.total_bytes),
            available_bytes: host_volume.and_then(|v| v.available_bytes),
        }];

        roots.extend(volumes.iter().map(|v| {
            let token = v.token();
            let label = if v.name.is_empty() || v.name == token {
                token.clone()
            } else {
                format!("{} ({})", token, v.name)
            };
            RootInfo {
                token,
                label,
                kind: RootKind::Volume,
                total_bytes: v.total_bytes,
                available_bytes: v.available_bytes,
            }
        }));

        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data_root() -> DataRoot {
        DataRoot {
            token: "DATA".to_string(),
            path: PathBuf::from("/srv/app/data"),
        }
    }

    fn drive(letter: char) -> Volume {
        Volume::new(format!("{}:{}", letter, MAIN_SEPARATOR))
    }

    #[test]
    fn test_candidate_path() {
        assert_eq!(
            candidate_path("C:"),
            PathBuf::from(format!("C:{}", MAIN_SEPARATOR))
        );
        assert_eq!(
            candidate_path("d:"),
            PathBuf::from(format!("D:{}", MAIN_SEPARATOR))
        );
        assert_eq!(candidate_path("1:"), PathBuf::from("1:"));
        assert_eq!(candidate_path("/mnt/usb"), PathBuf::from("/mnt/usb"));
    }

    #[test]
    fn test_missing_token_selects_data_dir() {
        let selected = match_root(None, &data_root(), &[]).unwrap();
        assert_eq!(selected.kind, RootKind::DataDir);
        assert_eq!(selected.base, PathBuf::from("/srv/app/data"));

        let selected = match_root(Some("  "), &data_root(), &[]).unwrap();
        assert_eq!(selected.kind, RootKind::DataDir);

        let selected = match_root(Some("DATA"), &data_root(), &[]).unwrap();
        assert_eq!(selected.token, "DATA");
    }

    #[test]
    fn test_drive_letter_selects_volume() {
        let volumes = vec![drive('C'), drive('D')];
        let selected = match_root(Some("D:"), &data_root(), &volumes).unwrap();
        assert_eq!(selected.kind, RootKind::Volume);
        assert_eq!(selected.token, "D:");
        assert_eq!(selected.base, PathBuf::from(format!("D:{}", MAIN_SEPARATOR)));
    }

    #[test]
    fn test_mount_path_selects_volume() {
        let volumes = vec![Volume::new("/"), Volume::new("/mnt/usb")];
        let selected = match_root(Some("/mnt/usb"), &data_root(), &volumes).unwrap();
        assert_eq!(selected.token, "/mnt/usb");

        let selected = match_root(Some("/"), &data_root(), &volumes).unwrap();
        assert_eq!(selected.token, "/");
        assert_eq!(selected.base, PathBuf::from("/"));
    }

    #[test]
    fn test_unknown_token_is_unmatched() {
        let volumes = vec![drive('C')];
        assert!(match_root(Some("Z:"), &data_root(), &volumes).is_none());
        assert!(match_root(Some("/etc"), &data_root(), &volumes).is_none());
        // 共享字符串前缀的路径不算匹配
        assert!(match_root(Some("/srv/app/data2"), &data_root(), &volumes).is_none());
    }

    #[test]
    fn test_data_dir_path_token() {
        let selected = match_root(Some("/srv/app/data"), &data_root(), &[]).unwrap();
        assert_eq!(selected.kind, RootKind::DataDir);
        assert_eq!(selected.token, "DATA");
    }

    fn storage(strict: bool) -> StorageConfig {
        StorageConfig {
            data_dir: PathBuf::from("/srv/app/data"),
            data_root_token: "DATA".to_string(),
            volume_cache_secs: 0,
            strict_root_selection: strict,
        }
    }

    #[test]
    fn test_selector_falls_back() {
        let selector = RootSelector::new(
            &storage(false),
            Arc::new(StaticVolumes(vec![Volume::new("/mnt/usb")])),
        );

        let selected = selector.select(Some("/mnt/gone")).unwrap();
        assert_eq!(selected, selector.data_root());

        let selected = selector.select(Some("/mnt/usb")).unwrap();
        assert_eq!(selected.kind, RootKind::Volume);
    }

    #[test]
    fn test_selector_strict_rejects() {
        let selector = RootSelector::new(&storage(true), Arc::new(StaticVolumes::default()));

        let err = selector.select(Some("/mnt/gone")).unwrap_err();
        assert_eq!(err.code, FsErrorCode::AccessDenied);

        // 数据目录始终可用
        assert!(selector.select(None).is_ok());
        assert!(selector.select(Some("DATA")).is_ok());
    }

    #[test]
    fn test_list_roots() {
        let mut usb = Volume::new("/mnt/usb");
        usb.name = "sdb1".to_string();
        usb.total_bytes = Some(100);
        let selector = RootSelector::new(&storage(false), Arc::new(StaticVolumes(vec![usb])));

        let roots = selector.list_roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].kind, RootKind::DataDir);
        assert_eq!(roots[0].token, "DATA");
        assert_eq!(roots[1].token, "/mnt/usb");
        assert_eq!(roots[1].label, "/mnt/usb (sdb1)");
        assert_eq!(roots[1].total_bytes, Some(100));
    }

    #[test]
    fn test_volume_token() {
        assert_eq!(Volume::new("/").token(), "/");
        assert_eq!(Volume::new("/mnt/usb/").token(), "/mnt/usb");
        assert_eq!(Volume::new("C:\\").token(), "C:");
    }

    struct CountingVolumes(AtomicUsize);

    impl VolumeSource for CountingVolumes {
        fn list_volumes(&self) -> Vec<Volume> {
            self.0.fetch_add(1, Ordering::SeqCst);
            vec![Volume::new("/mnt/usb")]
        }
    }

    #[test]
    fn test_cached_volumes() {
        let cached = CachedVolumes::new(CountingVolumes(AtomicUsize::new(0)), Duration::from_secs(60));
        assert_eq!(cached.list_volumes().len(), 1);
        assert_eq!(cached.list_volumes().len(), 1);
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 1);

        let uncached = CachedVolumes::new(CountingVolumes(AtomicUsize::new(0)), Duration::ZERO);
        uncached.list_volumes();
        uncached.list_volumes();
        assert_eq!(uncached.inner.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_system_volumes_are_accessible() {
        for volume in SystemVolumes.list_volumes() {
            assert!(is_accessible(&volume.mount_point));
        }
    }
}

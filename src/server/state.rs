// 应用状态

use crate::config::AppConfig;
use crate::filesystem::{FilesystemService, RootSelector};
use std::sync::Arc;

/// 应用全局状态
///
/// 配置在启动后只读，不需要锁
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 根选择器
    pub roots: Arc<RootSelector>,
    /// 文件操作服务
    pub fs: Arc<FilesystemService>,
}

impl AppState {
    /// 使用系统卷枚举创建应用状态
    pub fn new(config: AppConfig) -> Self {
        let roots = RootSelector::from_config(&config.storage);
        Self::with_roots(config, roots)
    }

    /// 使用指定的根选择器创建应用状态
    pub fn with_roots(config: AppConfig, roots: RootSelector) -> Self {
        let fs = FilesystemService::new(
            config.filesystem.clone(),
            config.upload.allowed_extensions.clone(),
        );

        Self {
            config: Arc::new(config),
            roots: Arc::new(roots),
            fs: Arc::new(fs),
        }
    }
}

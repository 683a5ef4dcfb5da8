// LocalBox
// 通过浏览器访问的本地文件管理服务

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 本地文件管理模块
pub mod filesystem;

// Web服务器模块
pub mod server;

// 导出常用类型
pub use config::AppConfig;
pub use filesystem::{FilesystemService, FsError, FsErrorCode, PathGuard, RootSelector};
pub use server::{build_router, AppState};

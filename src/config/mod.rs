// 配置管理模块

pub mod path_validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use path_validator::{PathValidationResult, PathValidator};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
///
/// 启动时构造一次，之后以只读方式共享给所有组件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储根配置
    pub storage: StorageConfig,
    /// 文件系统配置
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 20MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// 前端静态资源目录（为空时自动探测）
    #[serde(default)]
    pub frontend_dir: Option<PathBuf>,
}

/// 存储根配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 应用数据目录（始终可用的默认根）
    pub data_dir: PathBuf,
    /// 客户端用来指代数据目录的标识
    #[serde(default = "default_data_root_token")]
    pub data_root_token: String,
    /// 卷枚举结果缓存时长（秒），0 表示每次请求都重新枚举
    #[serde(default = "default_volume_cache_secs")]
    pub volume_cache_secs: u64,
    /// 严格模式：未知的根标识直接拒绝，而不是回退到数据目录
    #[serde(default)]
    pub strict_root_selection: bool,
}

fn default_data_root_token() -> String {
    "DATA".to_string()
}

fn default_volume_cache_secs() -> u64 {
    5
}

impl StorageConfig {
    /// 验证数据目录是否为绝对路径
    pub fn validate_data_dir(&self) -> Result<()> {
        if !self.data_dir.is_absolute() {
            anyhow::bail!(
                "数据目录必须是绝对路径，当前值: {:?}\n\
                 Windows 示例: D:\\LocalBox\\data\n\
                 Linux/Docker 示例: /app/data 或 /home/user/localbox/data",
                self.data_dir
            );
        }
        if self.data_root_token.trim().is_empty() {
            anyhow::bail!("数据目录标识不能为空");
        }
        Ok(())
    }

    /// 确保数据目录存在并且可用
    pub fn ensure_data_dir(&self) -> Result<PathValidationResult> {
        self.validate_data_dir()?;
        PathValidator::ensure_directory_exists(&self.data_dir)?;

        let result = PathValidator::validate(&self.data_dir);
        if !result.valid {
            anyhow::bail!(
                "数据目录不可用: {}{}",
                result.message,
                result
                    .details
                    .as_deref()
                    .map(|d| format!("（{}）", d))
                    .unwrap_or_default()
            );
        }

        tracing::info!("数据目录已准备就绪: {:?}", self.data_dir);
        Ok(result)
    }
}

/// 文件系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// 是否显示隐藏文件
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
    /// 预览文件大小上限（字节）
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: u64,
}

fn default_show_hidden() -> bool {
    true
}

fn default_preview_max_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            show_hidden: default_show_hidden(),
            preview_max_bytes: default_preview_max_bytes(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 允许上传的扩展名（小写，不带点）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// 单次请求体大小上限（字节）
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_allowed_extensions() -> Vec<String> {
    [
        // 文档
        "txt", "pdf", "doc", "docx", "xls", "xlsx",
        // 图片
        "png", "jpg", "jpeg", "gif", "webp", "bmp",
        // 音频
        "mp3", "wav",
        // 视频
        "mp4", "avi", "mov", "mkv",
        // 压缩包
        "zip", "rar",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_request_bytes() -> usize {
    500 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

/// 检测是否运行在容器中
///
/// 依次检查 /.dockerenv、/proc/1/cgroup 以及 container 环境变量
pub fn is_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    if let Ok(content) = std::fs::read_to_string("/proc/1/cgroup") {
        if content.contains("docker") || content.contains("containerd") {
            return true;
        }
    }

    std::env::var("container").is_ok()
}

impl Default for AppConfig {
    fn default() -> Self {
        let in_container = is_container();

        // 容器内使用 /app/data，本地使用当前工作目录 + data
        let data_dir = if in_container {
            PathBuf::from("/app/data")
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("data")
        };

        // 容器内监听 0.0.0.0 以便从宿主机访问
        let host = if in_container {
            "0.0.0.0".to_string()
        } else {
            "127.0.0.1".to_string()
        };

        tracing::info!(
            "检测到环境 (容器: {}), 使用默认数据目录: {:?}, 服务器监听地址: {}",
            in_container,
            data_dir,
            host
        );

        Self {
            server: ServerConfig {
                host,
                port: 5000,
                cors_origins: vec!["*".to_string()],
                frontend_dir: None,
            },
            storage: StorageConfig {
                data_dir,
                data_root_token: default_data_root_token(),
                volume_cache_secs: default_volume_cache_secs(),
                strict_root_selection: false,
            },
            filesystem: FilesystemConfig::default(),
            upload: UploadConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .storage
            .validate_data_dir()
            .context("配置文件中的数据目录验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.storage
            .validate_data_dir()
            .context("保存配置失败：数据目录必须是绝对路径")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }

                default_config
            }
        }
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

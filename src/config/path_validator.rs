// 路径验证模块
//
// 启动时用于检查数据目录是否存在、是否为目录、是否可写

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 路径验证结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathValidationResult {
    /// 路径是否完全可用
    pub valid: bool,
    /// 路径是否存在
    pub exists: bool,
    /// 路径是否可写
    pub is_writable: bool,
    /// 是否是目录
    pub is_directory: bool,
    /// 验证消息
    pub message: String,
    /// 详细错误信息（如果有）
    pub details: Option<String>,
}

impl PathValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            exists: true,
            is_writable: true,
            is_directory: true,
            message: "路径验证通过".to_string(),
            details: None,
        }
    }

    fn rejected(exists: bool, is_directory: bool, message: &str, details: String) -> Self {
        Self {
            valid: false,
            exists,
            is_writable: false,
            is_directory,
            message: message.to_string(),
            details: Some(details),
        }
    }
}

/// 路径验证器
pub struct PathValidator;

impl PathValidator {
    /// 验证目录是否可以作为数据根使用
    ///
    /// 依次检查：存在 → 是目录 → 可写
    pub fn validate(path: &Path) -> PathValidationResult {
        if !path.exists() {
            return PathValidationResult::rejected(
                false,
                false,
                "路径不存在",
                format!("路径 {:?} 不存在，请确保路径正确或先创建该目录", path),
            );
        }

        if !path.is_dir() {
            return PathValidationResult::rejected(
                true,
                false,
                "路径不是目录",
                format!("路径 {:?} 不是一个目录，请指定目录路径", path),
            );
        }

        if !Self::check_writable(path) {
            return PathValidationResult::rejected(
                true,
                true,
                "路径不可写",
                format!("路径 {:?} 没有写入权限，请检查目录权限", path),
            );
        }

        PathValidationResult::ok()
    }

    /// 通过创建临时文件的方式检测写入权限
    fn check_writable(path: &Path) -> bool {
        let probe = path.join(".localbox_write_probe");

        match fs::File::create(&probe) {
            Ok(_) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }

    /// 自动创建目录（如果不存在）
    pub fn ensure_directory_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("无法创建目录: {:?}", path))?;
            tracing::info!("自动创建数据目录: {:?}", path);
        }
        Ok(())
    }
}

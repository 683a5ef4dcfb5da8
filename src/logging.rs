//! 日志初始化
//!
//! 控制台输出 + 可选的文件输出。文件按启动时间命名，超过大小上限时递增序号，
//! 启动时清理超过保留天数的旧文件

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "localbox.";
const LOG_FILE_SUFFIX: &str = ".log";
const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

struct RollingFile {
    dir: PathBuf,
    /// 启动时间戳 YYYY-MM-DD-HHMMSS
    stamp: String,
    /// 0 为首个文件，之后每次滚动加一
    index: u32,
    max_size: u64,
    written: u64,
    file: Option<File>,
}

impl RollingFile {
    fn open(dir: PathBuf, max_size: u64) -> io::Result<Self> {
        let mut rolling = Self {
            dir,
            stamp: Local::now().format("%Y-%m-%d-%H%M%S").to_string(),
            index: 0,
            max_size,
            written: 0,
            file: None,
        };
        rolling.open_current()?;
        Ok(rolling)
    }

    fn current_path(&self) -> PathBuf {
        let name = match self.index {
            0 => format!("{}{}{}", LOG_FILE_PREFIX, self.stamp, LOG_FILE_SUFFIX),
            n => format!("{}{}_{}{}", LOG_FILE_PREFIX, self.stamp, n, LOG_FILE_SUFFIX),
        };
        self.dir.join(name)
    }

    fn open_current(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.written = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(file);
        Ok(())
    }

    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 空文件总是接收当前写入，避免单条超长日志反复滚动
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            if let Some(mut file) = self.file.take() {
                file.flush()?;
            }
            self.index += 1;
            self.open_current()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件未打开"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// 按大小滚动的日志文件写入器
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<RollingFile>>,
}

impl LogFileManager {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFile::open(log_dir, max_file_size)?)),
        })
    }

    /// 当前正在写入的文件
    pub fn current_path(&self) -> PathBuf {
        self.inner.lock().current_path()
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_chunk(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// 日志守卫，drop 后后台写入线程退出
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化全局日志
///
/// `RUST_LOG` 优先于配置中的级别；文件输出初始化失败时退化为仅控制台
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIMER_FORMAT.to_string()))
        .with_ansi(true);

    let file_manager = if config.enabled {
        match fs::create_dir_all(&config.log_dir)
            .and_then(|_| LogFileManager::new(config.log_dir.clone(), config.max_file_size))
        {
            Ok(manager) => Some(manager),
            Err(e) => {
                eprintln!("日志文件初始化失败: {:?}, 错误: {}，仅输出到控制台", config.log_dir, e);
                None
            }
        }
    } else {
        None
    };

    let Some(file_manager) = file_manager else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        info!("日志系统初始化完成（仅控制台）");
        return LogGuard { _file_guard: None };
    };

    let current = file_manager.current_path();
    let (writer, file_guard) = tracing_appender::non_blocking(file_manager);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIMER_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 文件={:?}, 保留 {} 天, 级别={}, 单文件上限 {:.1}MB",
        current,
        config.retention_days,
        config.level,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    let removed = cleanup_old_logs(&config.log_dir, config.retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("已清理 {} 个过期日志文件", removed);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 删除早于保留期限的日志文件，返回删除数量
///
/// 只处理本程序生成的文件；文件名中的日期无法解析时按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let retention = chrono::Duration::days(retention_days as i64);
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !name.starts_with(LOG_FILE_PREFIX) || !name.ends_with(LOG_FILE_SUFFIX) {
            continue;
        }

        let expired = match date_from_file_name(name) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => modified_before(&entry, retention),
        };
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("已删除过期日志: {:?}", path);
                removed += 1;
            }
            Err(e) => tracing::warn!("删除过期日志失败: {:?}, 错误: {}", path, e),
        }
    }

    removed
}

/// `localbox.2024-05-01-093000_2.log` → 2024-05-01
fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    let date = stem.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn modified_before(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
        return false;
    };
    let modified: chrono::DateTime<chrono::Utc> = modified.into();
    chrono::Utc::now().signed_duration_since(modified) > retention
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_date_from_file_name() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(date_from_file_name("localbox.2024-05-01-093000.log"), expected);
        assert_eq!(date_from_file_name("localbox.2024-05-01-093000_3.log"), expected);
        assert_eq!(date_from_file_name("localbox.2024-05-01.log"), expected);
        assert_eq!(date_from_file_name("localbox.garbage.log"), None);
        assert_eq!(date_from_file_name("other.2024-05-01.log"), None);
    }

    #[test]
    fn test_rotation_by_size() {
        let temp = TempDir::new().unwrap();
        let mut manager = LogFileManager::new(temp.path().to_path_buf(), 16).unwrap();
        let first = manager.current_path();

        manager.write_all(b"0123456789").unwrap();
        manager.write_all(b"0123456789").unwrap();
        manager.flush().unwrap();

        let second = manager.current_path();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_1.log"));
        assert_eq!(fs::read(&first).unwrap(), b"0123456789");
        assert_eq!(fs::read(&second).unwrap(), b"0123456789");
    }

    #[test]
    fn test_cleanup_old_logs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("localbox.2024-01-01-120000.log"), b"old").unwrap();
        fs::write(dir.join("localbox.2024-01-01-120000_1.log"), b"old").unwrap();
        fs::write(dir.join("localbox.2024-01-09-120000.log"), b"new").unwrap();
        fs::write(dir.join("unrelated.2024-01-01.log"), b"keep").unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let removed = cleanup_old_logs(dir, 7, today);

        assert_eq!(removed, 2);
        assert!(dir.join("localbox.2024-01-09-120000.log").exists());
        assert!(dir.join("unrelated.2024-01-01.log").exists());
    }
}

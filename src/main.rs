use anyhow::Context;
use localbox::{
    build_router,
    config::{AppConfig, LogConfig, DEFAULT_CONFIG_PATH},
    logging, AppState,
};
use tracing::info;

/// 加载日志配置
///
/// 日志必须先于完整配置初始化，这里只读取 [log] 段，失败时使用默认值
async fn load_log_config() -> LogConfig {
    let Ok(content) = tokio::fs::read_to_string(DEFAULT_CONFIG_PATH).await else {
        return LogConfig::default();
    };

    toml::from_str::<toml::Value>(&content)
        .ok()
        .and_then(|value| value.get("log").cloned())
        .and_then(|table| table.try_into::<LogConfig>().ok())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = load_log_config().await;
    let _log_guard = logging::init_logging(&log_config);

    info!("LocalBox v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(DEFAULT_CONFIG_PATH).await;
    config
        .storage
        .ensure_data_dir()
        .context("数据目录初始化失败")?;

    let addr = config.bind_addr();
    let data_dir = config.storage.data_dir.clone();
    let strict = config.storage.strict_root_selection;

    let state = AppState::new(config);
    for root in state.roots.list_roots() {
        info!("可用根: {} ({:?})", root.label, root.kind);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听地址绑定失败: {}", addr))?;

    info!("服务器启动在: http://{}", addr);
    info!("数据目录: {:?} (严格根选择: {})", data_dir, strict);
    info!("健康检查: http://{}/health", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，正在退出...");
        }
    }

    info!("应用已退出");
    Ok(())
}

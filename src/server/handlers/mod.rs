// API处理器模块

pub mod files;
pub mod roots;
pub mod transfer;

pub use files::*;
pub use roots::*;
pub use transfer::*;

use crate::filesystem::FsError;
use crate::server::error::ApiResult;
use crate::server::state::AppState;

/// 在阻塞线程池上执行文件系统操作
async fn run_blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> Result<T, FsError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    Ok(tokio::task::spawn_blocking(move || f(&state)).await??)
}

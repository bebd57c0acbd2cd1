//! 日志初始化
//!
//! 库本身只通过 `tracing` 输出日志，由应用决定是否安装订阅者。

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` 未设置时使用的过滤规则
pub const DEFAULT_LOG_FILTER: &str = "gyrobot_driver=info,gyrobot_client=info,gyrobot_sdk=info";

/// 安装 fmt 订阅者并把 `log` 记录桥接到 `tracing`
///
/// 优先使用 `RUST_LOG`，未设置时使用 [`DEFAULT_LOG_FILTER`]。
///
/// # 错误
///
/// 全局订阅者已经安装过时返回错误（可以忽略）。
pub fn try_init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// 同 [`try_init_logging`]，重复初始化时静默忽略
pub fn init_logging() {
    if let Err(e) = try_init_logging() {
        tracing::debug!("Logging already initialized: {}", e);
    }
}

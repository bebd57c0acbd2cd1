//! 运动控制层错误类型定义

use gyrobot_driver::{BalancePhase, ConfigError, DriverError};
use thiserror::Error;

/// 运动控制层错误类型
#[derive(Error, Debug)]
pub enum PilotError {
    /// 参数不合法（调用被拒绝，状态不变）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 平衡会话已经结束（跌倒或关闭）
    #[error("Balance session ended ({0:?})")]
    SessionEnded(BalancePhase),

    /// 构建时缺少必要组件
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 线程错误
    #[error("Thread error: {0}")]
    Thread(String),
}

impl PilotError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

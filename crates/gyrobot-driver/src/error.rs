//! 驱动层错误类型定义

use crate::config::ConfigError;
use gyrobot_hal::HalError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 硬件访问错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 配置无效
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 陀螺仪校准在允许的尝试次数内没有得到稳定批次
    ///
    /// `spread` 为最后一批采样的极差（度/秒）。
    #[error("Gyro calibration unstable after {attempts} attempts (last spread {spread:.3} deg/s)")]
    CalibrationUnstable { attempts: u32, spread: f64 },

    /// 平衡线程启动失败
    #[error("Balance thread error: {0}")]
    BalanceThread(String),

    /// 平衡会话已经结束（跌倒或关闭）
    #[error("Balance session is no longer running")]
    SessionEnded,
}

//! 平衡驱动层
//!
//! 本 crate 负责让两轮自平衡车保持直立，包括：
//! - 陀螺仪校准与零偏跟踪
//! - 平衡状态估计（倾角、轮子位置/速度、控制间隔）
//! - 平衡控制与跌倒检测
//! - 平衡线程管理（ArcSwap 无锁快照、可中断的周期等待）
//!
//! # 使用场景
//!
//! 只需要原地平衡、或者想自己实现运动控制时直接使用本 crate。
//! 需要行驶、原地转向和弧线运动时使用 `gyrobot-client`。

pub mod balancer;
pub mod config;
pub mod controller;
mod error;
pub mod estimator;
pub mod gyro;
pub mod phase;
pub mod pipeline;
pub mod state;

pub use balancer::{Balancer, JOIN_TIMEOUT, JoinTimeout};
pub use config::{BalanceConfig, BalanceGains, CalibrationConfig, ConfigError};
pub use controller::{BalanceController, MAX_POWER, TickOutcome, WheelPowers};
pub use error::DriverError;
pub use estimator::{BalanceEstimator, BalanceState};
pub use gyro::GyroOffsetTracker;
pub use phase::{AtomicBalancePhase, BalancePhase};
pub use pipeline::{PeriodicTimer, TickWait, balance_loop};
pub use state::{BalanceContext, BalanceSnapshot, DriveDemand, SessionEvent};

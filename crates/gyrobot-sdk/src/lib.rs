//! Gyrobot SDK - 两轮自平衡车 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **硬件层** (`hal`): 电机与陀螺仪 trait，`mock` feature 提供模拟硬件
//! - **驱动层** (`driver`): 陀螺校准、状态估计、平衡线程、跌倒检测
//! - **客户端层** (`client`): 行驶、旋转、圆弧、位置保持和运动观察者
//!
//! # 快速开始
//!
//! ```ignore
//! use gyrobot_sdk::prelude::*;
//!
//! gyrobot_sdk::init_logging();
//! let pilot = PilotBuilder::new()
//!     .left_motor(left)
//!     .right_motor(right)
//!     .gyroscope(gyro)
//!     .build()?;
//! pilot.travel(56.0, false)?;
//! ```
//!
//! 只需要原地平衡时可以直接使用驱动层：
//!
//! ```ignore
//! use gyrobot_sdk::driver::{BalanceConfig, BalanceController, Balancer};
//! ```

pub use gyrobot_client as client;
pub use gyrobot_driver as driver;
pub use gyrobot_hal as hal;

mod logging;
pub mod prelude;

pub use logging::{DEFAULT_LOG_FILTER, init_logging, try_init_logging};

// 硬件层
pub use hal::{EncoderMotor, Gyroscope, HalError};

// 驱动层
pub use driver::{BalanceConfig, BalancePhase, BalanceSnapshot, DriverError, SessionEvent};

// 客户端层（推荐入口）
pub use client::{
    MotionMode, Move, MoveKind, MoveObserver, PilotBuilder, PilotConfig, PilotError,
    SegwayPilot, WheelGeometry,
};

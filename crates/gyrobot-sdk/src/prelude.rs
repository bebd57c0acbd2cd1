//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use gyrobot_sdk::prelude::*;
//! ```

// 客户端层
pub use crate::client::{
    ChannelObserver, MotionMode, Move, MoveEvent, MoveKind, MoveObserver, PilotBuilder,
    PilotConfig, PilotHandle, SegwayPilot,
};

// 硬件层 trait
pub use crate::hal::{EncoderMotor, Gyroscope};

// 驱动层
pub use crate::driver::{BalanceConfig, BalancePhase, BalanceSnapshot, SessionEvent};

// 错误类型
pub use crate::client::PilotError;
pub use crate::driver::DriverError;
pub use crate::hal::HalError;

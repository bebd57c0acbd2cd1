//! # Gyrobot Client
//!
//! 两轮自平衡车的运动控制层，构建在 `gyrobot-driver` 的平衡线程之上：
//! - 直线行驶、原地旋转、圆弧和转向率指令（阻塞或立即返回）
//! - 空闲时的位置保持（回正修正）
//! - 运动开始/完成观察者
//!
//! 平衡线程是唯一写电机的线程；本层只改写驱动需求（前进速度和转向速度）。
//!
//! # 快速开始
//!
//! ```ignore
//! use gyrobot_client::PilotBuilder;
//!
//! let pilot = PilotBuilder::new()
//!     .left_motor(left)
//!     .right_motor(right)
//!     .gyroscope(gyro)
//!     .build()?;
//!
//! pilot.travel(56.0, false)?;
//! pilot.rotate(90.0, false)?;
//! pilot.arc(20.0, 90.0, false)?;
//! ```

pub mod builder;
pub mod config;
mod error;
pub mod geometry;
pub mod motion;
pub mod movement;
pub mod observer;
pub mod pilot;
pub mod pilot_core;
pub mod regulator;

pub use builder::PilotBuilder;
pub use config::PilotConfig;
pub use error::PilotError;
pub use geometry::{ArcWheels, MAX_TURN_RATE, WheelGeometry};
pub use motion::{MotionMode, MotionPlan, MotionTarget};
pub use movement::{Move, MoveKind};
pub use observer::{ChannelObserver, MoveEvent, MoveObserver, ObserverRegistry};
pub use pilot::{PilotHandle, SegwayPilot};
pub use pilot_core::PilotCore;
pub use regulator::{RegulatorAction, regulate};

//! # Gyrobot Hardware Abstraction Layer
//!
//! 电机与陀螺仪的硬件抽象层，平衡控制器只通过这里的 trait 访问硬件。
//!
//! # 编码器方向约定
//!
//! 对于两轮自平衡车，电机通常是反向安装的：
//! **电机以 `drive_forward()` 驱动时编码器计数减小**，车体向前行进时两轮编码器同时减小。
//! 上层的目标计算、到达判定和位移统计全部基于这一约定。

use thiserror::Error;

#[cfg(feature = "mock")]
pub mod mock;

/// 硬件层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Device disconnected")]
    Disconnected,
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    Busy,
    InvalidResponse,
    Stalled,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

/// 电机转动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorDirection {
    Forward,
    Backward,
    /// 断电滑行（不制动）
    #[default]
    Coast,
}

/// 带编码器的直流电机
///
/// 控制器在整个会话期间独占电机，不会跨线程共享同一个实例。
pub trait EncoderMotor: Send {
    /// 累计编码器计数（度），有符号，随转动方向增减
    fn encoder_count(&mut self) -> Result<i64, HalError>;

    /// 设置功率幅值（0..=100），方向由 `drive_forward`/`drive_backward` 决定
    fn set_power(&mut self, power: u8) -> Result<(), HalError>;

    fn drive_forward(&mut self) -> Result<(), HalError>;

    fn drive_backward(&mut self) -> Result<(), HalError>;

    /// 断电滑行
    fn coast(&mut self) -> Result<(), HalError>;
}

/// 单轴陀螺仪（平衡车俯仰轴）
pub trait Gyroscope: Send {
    /// 当前角速度（度/秒）
    fn angular_velocity_deg_per_sec(&mut self) -> Result<f32, HalError>;

    /// 让传感器重新建立自身的零偏（车体必须静止）
    fn recalibrate_offset(&mut self) -> Result<(), HalError>;
}

impl<T: EncoderMotor + ?Sized> EncoderMotor for Box<T> {
    fn encoder_count(&mut self) -> Result<i64, HalError> {
        (**self).encoder_count()
    }

    fn set_power(&mut self, power: u8) -> Result<(), HalError> {
        (**self).set_power(power)
    }

    fn drive_forward(&mut self) -> Result<(), HalError> {
        (**self).drive_forward()
    }

    fn drive_backward(&mut self) -> Result<(), HalError> {
        (**self).drive_backward()
    }

    fn coast(&mut self) -> Result<(), HalError> {
        (**self).coast()
    }
}

impl<T: Gyroscope + ?Sized> Gyroscope for Box<T> {
    fn angular_velocity_deg_per_sec(&mut self) -> Result<f32, HalError> {
        (**self).angular_velocity_deg_per_sec()
    }

    fn recalibrate_offset(&mut self) -> Result<(), HalError> {
        (**self).recalibrate_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_error_display() {
        let err = HalError::Timeout;
        assert_eq!(format!("{}", err), "Read timeout");

        let err = HalError::from(DeviceError::new(DeviceErrorKind::Stalled, "left wheel"));
        let msg = format!("{}", err);
        assert!(msg.contains("Stalled") && msg.contains("left wheel"), "{}", msg);
    }

    #[test]
    fn test_device_error_from_str() {
        let err: DeviceError = "boom".into();
        assert_eq!(err.kind, DeviceErrorKind::Unknown);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_motor_direction_default() {
        assert_eq!(MotorDirection::default(), MotorDirection::Coast);
    }
}

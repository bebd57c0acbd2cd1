//! Builder 模式实现
//!
//! 提供链式构造 `SegwayPilot` 的便捷方式。

use crate::config::PilotConfig;
use crate::error::PilotError;
use crate::pilot::SegwayPilot;
use gyrobot_driver::{BalanceConfig, BalanceController};
use gyrobot_hal::{EncoderMotor, Gyroscope};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// SegwayPilot Builder（链式构造）
///
/// # Example
///
/// ```ignore
/// use gyrobot_client::PilotBuilder;
///
/// let pilot = PilotBuilder::new()
///     .left_motor(left)
///     .right_motor(right)
///     .gyroscope(gyro)
///     .wheel_diameter(5.6)
///     .track_width(12.0)
///     .build()?;
/// pilot.travel(56.0, false)?;
/// ```
pub struct PilotBuilder {
    left: Option<Box<dyn EncoderMotor>>,
    right: Option<Box<dyn EncoderMotor>>,
    gyro: Option<Box<dyn Gyroscope>>,
    config: PilotConfig,
    /// 已知的陀螺零偏（设置后跳过校准）
    gyro_offset: Option<f64>,
    /// 启动后等待平衡稳定的时间
    settle_time: Duration,
}

impl PilotBuilder {
    pub fn new() -> Self {
        Self {
            left: None,
            right: None,
            gyro: None,
            config: PilotConfig::default(),
            gyro_offset: None,
            settle_time: Duration::ZERO,
        }
    }

    pub fn left_motor(mut self, motor: impl EncoderMotor + 'static) -> Self {
        self.left = Some(Box::new(motor));
        self
    }

    pub fn right_motor(mut self, motor: impl EncoderMotor + 'static) -> Self {
        self.right = Some(Box::new(motor));
        self
    }

    pub fn gyroscope(mut self, gyro: impl Gyroscope + 'static) -> Self {
        self.gyro = Some(Box::new(gyro));
        self
    }

    /// 整体替换配置（之后的 `wheel_diameter` 等调用仍可覆盖单项）
    pub fn config(mut self, config: PilotConfig) -> Self {
        self.config = config;
        self
    }

    /// 从 TOML 文件加载配置
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, PilotError> {
        self.config = PilotConfig::load_from_file(path)?;
        Ok(self)
    }

    pub fn balance_config(mut self, config: BalanceConfig) -> Self {
        self.config.balance = config;
        self
    }

    pub fn wheel_diameter(mut self, diameter: f64) -> Self {
        self.config.balance.wheel_diameter = diameter;
        self
    }

    pub fn track_width(mut self, width: f64) -> Self {
        self.config.track_width = width;
        self
    }

    pub fn travel_speed(mut self, speed: f64) -> Self {
        self.config.travel_speed = speed;
        self
    }

    pub fn move_delay(mut self, delay: Duration) -> Self {
        self.config.move_delay_ms = delay.as_millis() as u64;
        self
    }

    /// 使用已知零偏，跳过静态校准
    pub fn gyro_offset(mut self, offset: f64) -> Self {
        self.gyro_offset = Some(offset);
        self
    }

    /// 启动后阻塞等待的时间，让车体先稳定下来
    pub fn settle_time(mut self, settle: Duration) -> Self {
        self.settle_time = settle;
        self
    }

    /// 校准陀螺仪（车体必须静止）并启动平衡线程和调节线程
    ///
    /// # 错误
    ///
    /// - `MissingComponent`: 缺少电机或陀螺仪
    /// - `InvalidArgument` / `Config`: 配置无效
    /// - `Driver`: 校准失败或读取编码器失败
    pub fn build(self) -> Result<SegwayPilot, PilotError> {
        let left = self.left.ok_or(PilotError::MissingComponent("left motor"))?;
        let right = self.right.ok_or(PilotError::MissingComponent("right motor"))?;
        let gyro = self.gyro.ok_or(PilotError::MissingComponent("gyroscope"))?;
        self.config.validate()?;

        let balance = self.config.balance.clone();
        let controller = match self.gyro_offset {
            Some(offset) => BalanceController::with_gyro_offset(left, right, gyro, balance, offset)?,
            None => BalanceController::new(left, right, gyro, balance)?,
        };

        let pilot = SegwayPilot::start(controller, self.config)?;
        if !self.settle_time.is_zero() {
            debug!("Waiting {:?} for the vehicle to settle", self.settle_time);
            std::thread::sleep(self.settle_time);
        }
        Ok(pilot)
    }
}

impl Default for PilotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

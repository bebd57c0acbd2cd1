//! 模拟硬件
//!
//! 用于测试和演示的简化电机/陀螺仪模型。克隆出来的句柄共享同一份内部状态，
//! 测试代码可以一边把实例交给控制器，一边用另一个克隆观察和推进仿真。
//!
//! 电机模型：每次 [`SimulatedMotor::advance`] 按当前功率推进编码器
//! `gain * power` 度，`Forward` 方向让计数减小（与 crate 级方向约定一致）。

use crate::{DeviceError, DeviceErrorKind, EncoderMotor, Gyroscope, HalError, MotorDirection};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

#[derive(Debug)]
struct MotorModel {
    /// 连续位置（度），编码器读数为其四舍五入
    position: f64,
    power: u8,
    direction: MotorDirection,
    /// 每个仿真步、每单位功率推进的编码器度数
    gain: f64,
    failing_reads: u32,
    failing_commands: u32,
    failing_coasts: u32,
    coast_count: u32,
    command_count: u64,
}

/// 模拟编码器电机
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    model: Arc<Mutex<MotorModel>>,
}

impl SimulatedMotor {
    /// 默认增益：功率 100 时每步约 5 度
    pub const DEFAULT_GAIN: f64 = 0.05;

    pub fn new() -> Self {
        Self::with_gain(Self::DEFAULT_GAIN)
    }

    pub fn with_gain(gain: f64) -> Self {
        Self {
            model: Arc::new(Mutex::new(MotorModel {
                position: 0.0,
                power: 0,
                direction: MotorDirection::Coast,
                gain,
                failing_reads: 0,
                failing_commands: 0,
                failing_coasts: 0,
                coast_count: 0,
                command_count: 0,
            })),
        }
    }

    /// 推进一个仿真步
    pub fn advance(&self) {
        let mut m = self.model.lock();
        let step = m.gain * f64::from(m.power);
        match m.direction {
            MotorDirection::Forward => m.position -= step,
            MotorDirection::Backward => m.position += step,
            MotorDirection::Coast => {},
        }
    }

    /// 带符号的当前指令功率（前进为正，滑行为 0）
    pub fn signed_power(&self) -> i32 {
        let m = self.model.lock();
        match m.direction {
            MotorDirection::Forward => i32::from(m.power),
            MotorDirection::Backward => -i32::from(m.power),
            MotorDirection::Coast => 0,
        }
    }

    pub fn direction(&self) -> MotorDirection {
        self.model.lock().direction
    }

    /// 当前编码器读数（不受故障注入影响）
    pub fn encoder(&self) -> i64 {
        self.model.lock().position.round() as i64
    }

    pub fn set_encoder(&self, count: i64) {
        self.model.lock().position = count as f64;
    }

    pub fn set_gain(&self, gain: f64) {
        self.model.lock().gain = gain;
    }

    /// `coast()` 成功的次数
    pub fn coast_count(&self) -> u32 {
        self.model.lock().coast_count
    }

    /// 成功的写指令（功率、方向、滑行）总次数
    pub fn command_count(&self) -> u64 {
        self.model.lock().command_count
    }

    /// 让接下来 `n` 次编码器读取失败
    pub fn fail_next_reads(&self, n: u32) {
        self.model.lock().failing_reads = n;
    }

    /// 让接下来 `n` 次功率/方向指令失败（不含滑行）
    pub fn fail_next_commands(&self, n: u32) {
        self.model.lock().failing_commands = n;
    }

    /// 让接下来 `n` 次 `coast()` 失败
    pub fn fail_next_coasts(&self, n: u32) {
        self.model.lock().failing_coasts = n;
    }
}

impl MotorModel {
    fn take_command_failure(&mut self) -> Result<(), HalError> {
        if self.failing_commands > 0 {
            self.failing_commands -= 1;
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::Stalled,
                "simulated motor command failure",
            )));
        }
        Ok(())
    }
}

impl Default for SimulatedMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderMotor for SimulatedMotor {
    fn encoder_count(&mut self) -> Result<i64, HalError> {
        let mut m = self.model.lock();
        if m.failing_reads > 0 {
            m.failing_reads -= 1;
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::InvalidResponse,
                "simulated encoder read failure",
            )));
        }
        Ok(m.position.round() as i64)
    }

    fn set_power(&mut self, power: u8) -> Result<(), HalError> {
        let mut m = self.model.lock();
        m.take_command_failure()?;
        m.power = power.min(100);
        m.command_count += 1;
        Ok(())
    }

    fn drive_forward(&mut self) -> Result<(), HalError> {
        let mut m = self.model.lock();
        m.take_command_failure()?;
        m.direction = MotorDirection::Forward;
        m.command_count += 1;
        Ok(())
    }

    fn drive_backward(&mut self) -> Result<(), HalError> {
        let mut m = self.model.lock();
        m.take_command_failure()?;
        m.direction = MotorDirection::Backward;
        m.command_count += 1;
        Ok(())
    }

    fn coast(&mut self) -> Result<(), HalError> {
        let mut m = self.model.lock();
        if m.failing_coasts > 0 {
            m.failing_coasts -= 1;
            return Err(HalError::Timeout);
        }
        m.direction = MotorDirection::Coast;
        m.power = 0;
        m.coast_count += 1;
        m.command_count += 1;
        Ok(())
    }
}

#[derive(Debug)]
struct GyroModel {
    rate: f32,
    bias: f32,
    noise: f32,
    failing_reads: u32,
    recalibrations: u32,
}

/// 模拟陀螺仪
///
/// 读数 = 角速度 + 零偏 + 均匀噪声（`±noise`）。
#[derive(Debug, Clone)]
pub struct SimulatedGyro {
    model: Arc<Mutex<GyroModel>>,
}

impl SimulatedGyro {
    pub fn new() -> Self {
        Self::with_bias(0.0)
    }

    pub fn with_bias(bias: f32) -> Self {
        Self {
            model: Arc::new(Mutex::new(GyroModel {
                rate: 0.0,
                bias,
                noise: 0.0,
                failing_reads: 0,
                recalibrations: 0,
            })),
        }
    }

    pub fn set_rate(&self, rate: f32) {
        self.model.lock().rate = rate;
    }

    pub fn set_bias(&self, bias: f32) {
        self.model.lock().bias = bias;
    }

    pub fn set_noise(&self, noise: f32) {
        self.model.lock().noise = noise.abs();
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.model.lock().failing_reads = n;
    }

    pub fn recalibrations(&self) -> u32 {
        self.model.lock().recalibrations
    }
}

impl Default for SimulatedGyro {
    fn default() -> Self {
        Self::new()
    }
}

impl Gyroscope for SimulatedGyro {
    fn angular_velocity_deg_per_sec(&mut self) -> Result<f32, HalError> {
        let mut m = self.model.lock();
        if m.failing_reads > 0 {
            m.failing_reads -= 1;
            return Err(HalError::Timeout);
        }
        let noise = if m.noise > 0.0 {
            rand::thread_rng().gen_range(-m.noise..=m.noise)
        } else {
            0.0
        };
        Ok(m.rate + m.bias + noise)
    }

    fn recalibrate_offset(&mut self) -> Result<(), HalError> {
        self.model.lock().recalibrations += 1;
        Ok(())
    }
}

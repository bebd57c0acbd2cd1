//! 平衡控制器
//!
//! 每个周期：读传感器 → 估计状态 → 计算平衡功率 → 跌倒检测 → 差速转向 → 下发电机指令。
//!
//! # 时间感知
//!
//! `tick()` 显式接收 `now`，单元测试可以用合成时间驱动控制器，
//! 不依赖真实的线程调度。
//!
//! # 电机所有权
//!
//! 控制器独占两个电机和陀螺仪。`Drop` 时如果电机还没有滑行，会让它们滑行，
//! 平衡线程无论以何种方式退出都不会留下通电的电机。

use crate::config::{BalanceConfig, BalanceGains};
use crate::error::DriverError;
use crate::estimator::{BalanceEstimator, BalanceState};
use crate::gyro::GyroOffsetTracker;
use crate::state::{BalanceContext, BalanceSnapshot, DriveDemand};
use gyrobot_hal::{EncoderMotor, Gyroscope, HalError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 功率上限（绝对值）
pub const MAX_POWER: i32 = 100;

/// 连续失败时每隔多少次再记录一次日志
const FAILURE_LOG_EVERY: u64 = 100;

/// 单次 `coast()` 调用中每个电机最多尝试的次数
pub(crate) const COAST_ATTEMPTS: u32 = 3;

/// 两轮带符号功率（前进为正）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelPowers {
    pub left: i32,
    pub right: i32,
}

/// 单个周期的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// 正常平衡，附带实际生效的功率（指令失败的一侧保留上一次的值）
    Balanced(WheelPowers),
    /// 已判定跌倒，电机已滑行
    Fallen { saturated_for: Duration },
}

/// 平衡功率（截断为整数，未钳位）
///
/// `power = (Kgs·ω + Kga·θ) / wheelRatio + Kpos·pos + Kdrive·drive + Kspeed·speed`
pub fn balance_power(
    state: &BalanceState,
    drive: f64,
    gains: &BalanceGains,
    wheel_ratio: f64,
) -> i32 {
    let gyro_term =
        (gains.gyro_speed * state.angular_velocity + gains.gyro_angle * state.tilt_angle)
            / wheel_ratio;
    let raw = gyro_term
        + gains.position * state.position
        + gains.drive * drive
        + gains.speed * state.speed;
    // `as` 向零截断并饱和，NaN 得到 0
    raw as i32
}

/// 把转向修正叠加到平衡功率上，每个轮子钳位到 [-100, 100]
///
/// 正的 `power_steer` 让左轮少向前、右轮多向前，使左减右的编码器差增大。
pub fn split_steering(power: i32, power_steer: i32) -> WheelPowers {
    WheelPowers {
        left: power.saturating_sub(power_steer).clamp(-MAX_POWER, MAX_POWER),
        right: power.saturating_add(power_steer).clamp(-MAX_POWER, MAX_POWER),
    }
}

/// 让电机滑行，失败时在本次调用内重试，返回是否成功
fn coast_motor(motor: &mut dyn EncoderMotor, side: &str) -> bool {
    for attempt in 1..=COAST_ATTEMPTS {
        match motor.coast() {
            Ok(()) => return true,
            Err(e) => error!(
                "Failed to coast {} motor (attempt {}/{}): {}",
                side, attempt, COAST_ATTEMPTS, e
            ),
        }
    }
    false
}

fn drive_motor(motor: &mut dyn EncoderMotor, power: i32) -> Result<(), HalError> {
    motor.set_power(power.unsigned_abs().min(MAX_POWER as u32) as u8)?;
    if power > 0 {
        motor.drive_forward()
    } else {
        motor.drive_backward()
    }
}

/// 连续失败计数
#[derive(Debug, Default)]
struct FailureStreak {
    consecutive: u64,
}

impl FailureStreak {
    /// 记录一次失败，返回是否需要打日志（第 1 次及之后每 100 次）
    fn record(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1 || self.consecutive % FAILURE_LOG_EVERY == 0
    }

    /// 成功一次，返回结束的失败次数
    fn reset(&mut self) -> u64 {
        std::mem::take(&mut self.consecutive)
    }
}

/// 平衡控制器
pub struct BalanceController {
    left: Box<dyn EncoderMotor>,
    right: Box<dyn EncoderMotor>,
    gyro: Box<dyn Gyroscope>,
    config: BalanceConfig,
    estimator: BalanceEstimator,
    /// 左减右编码器差的目标，由转向需求积分得到
    diff_target: f64,
    last_unsaturated: Option<Instant>,
    encoders: (i64, i64),
    powers: WheelPowers,
    ticks: u64,
    fallen: Option<Duration>,
    /// 每个电机是否已确认滑行，失败的一侧在下一次 `coast()` 时重试
    left_coasted: bool,
    right_coasted: bool,
    gyro_failures: FailureStreak,
    encoder_failures: FailureStreak,
    motor_failures: FailureStreak,
}

impl BalanceController {
    /// 校准陀螺仪并创建控制器
    ///
    /// 车体必须静止，函数阻塞到校准完成。
    ///
    /// # 错误
    ///
    /// - 配置无效
    /// - 校准失败（`CalibrationUnstable`）
    /// - 读取初始编码器失败
    pub fn new(
        left: Box<dyn EncoderMotor>,
        right: Box<dyn EncoderMotor>,
        mut gyro: Box<dyn Gyroscope>,
        config: BalanceConfig,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        info!("Calibrating gyro, keep the vehicle still");
        let tracker =
            GyroOffsetTracker::calibrate(gyro.as_mut(), &config.calibration, config.gyro_ema_weight)?;
        Self::with_tracker(left, right, gyro, config, tracker)
    }

    /// 使用已知零偏创建控制器（跳过校准）
    pub fn with_gyro_offset(
        left: Box<dyn EncoderMotor>,
        right: Box<dyn EncoderMotor>,
        gyro: Box<dyn Gyroscope>,
        config: BalanceConfig,
        gyro_offset: f64,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let tracker = GyroOffsetTracker::new(gyro_offset, config.gyro_ema_weight);
        Self::with_tracker(left, right, gyro, config, tracker)
    }

    fn with_tracker(
        mut left: Box<dyn EncoderMotor>,
        mut right: Box<dyn EncoderMotor>,
        gyro: Box<dyn Gyroscope>,
        config: BalanceConfig,
        tracker: GyroOffsetTracker,
    ) -> Result<Self, DriverError> {
        let encoders = (left.encoder_count()?, right.encoder_count()?);
        debug!(
            "Balance controller ready: encoders=({}, {}), gyro offset={:.4}",
            encoders.0,
            encoders.1,
            tracker.offset()
        );
        Ok(Self {
            left,
            right,
            gyro,
            estimator: BalanceEstimator::new(tracker, config.seed_interval_s),
            diff_target: (encoders.0 - encoders.1) as f64,
            config,
            last_unsaturated: None,
            encoders,
            powers: WheelPowers::default(),
            ticks: 0,
            fallen: None,
            left_coasted: false,
            right_coasted: false,
            gyro_failures: FailureStreak::default(),
            encoder_failures: FailureStreak::default(),
            motor_failures: FailureStreak::default(),
        })
    }

    /// 执行一个平衡周期
    ///
    /// 跌倒之后再调用只返回跌倒结果，不再访问硬件。
    pub fn tick(&mut self, now: Instant, demand: DriveDemand) -> TickOutcome {
        if let Some(saturated_for) = self.fallen {
            return TickOutcome::Fallen { saturated_for };
        }

        let raw_gyro = self.read_gyro();
        let (left, right) = self.read_encoders();

        self.estimator.update(now, raw_gyro, left, right);
        self.estimator.apply_drive(demand.drive);
        let state = *self.estimator.state();

        let power = balance_power(
            &state,
            demand.drive,
            &self.config.gains,
            self.config.wheel_ratio(),
        );

        // 跌倒检测先于下发指令
        let last_ok = *self.last_unsaturated.get_or_insert(now);
        if power.abs() < MAX_POWER {
            self.last_unsaturated = Some(now);
        } else {
            let saturated_for = now.saturating_duration_since(last_ok);
            if saturated_for > self.config.saturation_window() {
                error!(
                    "Vehicle fell: power saturated at {} for {:?} (tilt {:.1} deg)",
                    power, saturated_for, state.tilt_angle
                );
                self.coast();
                self.fallen = Some(saturated_for);
                return TickOutcome::Fallen { saturated_for };
            }
        }

        self.diff_target += demand.steer * state.interval;
        let power_steer = (self.config.gains.steer * (self.diff_target - (left - right) as f64)) as i32;
        let applied = self.command(split_steering(power, power_steer));
        self.ticks += 1;
        TickOutcome::Balanced(applied)
    }

    /// 读取共享上下文中的驱动需求执行一个周期，正常时发布快照
    pub fn step(&mut self, now: Instant, ctx: &BalanceContext) -> TickOutcome {
        let outcome = self.tick(now, ctx.demand());
        if let TickOutcome::Balanced(_) = outcome {
            ctx.publish(self.snapshot(now));
        }
        outcome
    }

    /// 两个电机断电滑行
    ///
    /// 已经确认滑行的电机不重复下发；上次失败的电机会再次尝试。
    /// 返回两个电机是否都已滑行。
    pub fn coast(&mut self) -> bool {
        if !self.left_coasted && coast_motor(self.left.as_mut(), "left") {
            self.left_coasted = true;
            self.powers.left = 0;
        }
        if !self.right_coasted && coast_motor(self.right.as_mut(), "right") {
            self.right_coasted = true;
            self.powers.right = 0;
        }
        self.is_coasted()
    }

    /// 两个电机是否都已确认滑行
    pub fn is_coasted(&self) -> bool {
        self.left_coasted && self.right_coasted
    }

    /// 暂停恢复后重建时间基准
    ///
    /// 暂停期间的时长既不计入控制间隔，也不计入饱和时长；
    /// 暂停期间轮子被推动的位移不当作速度。
    pub fn rebase(&mut self, now: Instant) {
        let (left, right) = self.read_encoders();
        self.estimator.rebase(left, right);
        self.diff_target = (left - right) as f64;
        self.last_unsaturated = Some(now);
        debug!("Balance timing re-based at encoders ({}, {})", left, right);
    }

    /// 当前状态快照
    pub fn snapshot(&self, now: Instant) -> BalanceSnapshot {
        let state = self.estimator.state();
        BalanceSnapshot {
            left_encoder: self.encoders.0,
            right_encoder: self.encoders.1,
            left_power: self.powers.left,
            right_power: self.powers.right,
            tilt_angle: state.tilt_angle,
            angular_velocity: state.angular_velocity,
            gyro_offset: state.gyro_offset,
            tick_interval: state.interval,
            tick_count: self.ticks,
            timestamp: Some(now),
        }
    }

    pub fn state(&self) -> &BalanceState {
        self.estimator.state()
    }

    /// 最近一次读到的编码器 `(left, right)`
    pub fn encoders(&self) -> (i64, i64) {
        self.encoders
    }

    pub fn powers(&self) -> WheelPowers {
        self.powers
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn is_fallen(&self) -> bool {
        self.fallen.is_some()
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    fn read_gyro(&mut self) -> Option<f64> {
        match self.gyro.angular_velocity_deg_per_sec() {
            Ok(v) => {
                let streak = self.gyro_failures.reset();
                if streak > 0 {
                    debug!("Gyro recovered after {} failed reads", streak);
                }
                Some(f64::from(v))
            },
            Err(e) => {
                if self.gyro_failures.record() {
                    warn!(
                        "Gyro read failed ({} consecutive), skipping sample: {}",
                        self.gyro_failures.consecutive, e
                    );
                }
                None
            },
        }
    }

    fn read_encoders(&mut self) -> (i64, i64) {
        let left = self.left.encoder_count();
        let right = self.right.encoder_count();
        match (left, right) {
            (Ok(l), Ok(r)) => {
                let streak = self.encoder_failures.reset();
                if streak > 0 {
                    debug!("Encoders recovered after {} failed reads", streak);
                }
                self.encoders = (l, r);
            },
            (l, r) => {
                // 读成功的一侧照常更新，失败的一侧沿用上次的计数
                if let Ok(l) = &l {
                    self.encoders.0 = *l;
                }
                if let Ok(r) = &r {
                    self.encoders.1 = *r;
                }
                if self.encoder_failures.record() {
                    let e = l.err().or(r.err());
                    warn!(
                        "Encoder read failed ({} consecutive), reusing previous count: {:?}",
                        self.encoder_failures.consecutive, e
                    );
                }
            },
        }
        self.encoders
    }

    /// 分别下发两个电机的指令，返回实际生效的功率
    fn command(&mut self, target: WheelPowers) -> WheelPowers {
        // 指令失败时电机状态未知，两侧都不再视为已滑行
        self.left_coasted = false;
        self.right_coasted = false;
        let left = drive_motor(self.left.as_mut(), target.left);
        let right = drive_motor(self.right.as_mut(), target.right);
        if left.is_ok() {
            self.powers.left = target.left;
        }
        if right.is_ok() {
            self.powers.right = target.right;
        }

        if left.is_ok() && right.is_ok() {
            let streak = self.motor_failures.reset();
            if streak > 0 {
                debug!("Motor commands recovered after {} failures", streak);
            }
        } else if self.motor_failures.record() {
            let n = self.motor_failures.consecutive;
            if let Err(e) = &left {
                warn!("Left motor command failed ({} consecutive): {}", n, e);
            }
            if let Err(e) = &right {
                warn!("Right motor command failed ({} consecutive): {}", n, e);
            }
        }
        self.powers
    }
}

impl Drop for BalanceController {
    fn drop(&mut self) {
        if !self.coast() {
            error!("Balance controller dropped with a motor that refused to coast");
        }
    }
}

impl std::fmt::Debug for BalanceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceController")
            .field("encoders", &self.encoders)
            .field("powers", &self.powers)
            .field("ticks", &self.ticks)
            .field("fallen", &self.fallen)
            .finish_non_exhaustive()
    }
}

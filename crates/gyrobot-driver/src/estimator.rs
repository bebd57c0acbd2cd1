//! 平衡状态估计
//!
//! 每个控制周期融合一次陀螺仪读数和两个编码器计数，得到倾角、角速度、
//! 轮子位置和速度。状态只由平衡线程修改。

use crate::gyro::GyroOffsetTracker;
use std::time::Instant;

/// 速度估计使用的编码器增量窗口长度（与增益一起整定，固定为 4）
pub const SPEED_WINDOW: usize = 4;

/// 平衡状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BalanceState {
    /// 去零偏后的角速度（度/秒）
    pub angular_velocity: f64,
    /// 角速度的时间积分（度）
    pub tilt_angle: f64,
    /// 当前陀螺零偏（度/秒）
    pub gyro_offset: f64,
    /// 两轮编码器之和的累计位置（度），驱动需求会持续把它向后拉
    pub position: f64,
    /// 两轮编码器之和的速度（度/秒）
    pub speed: f64,
    /// 最近 4 个周期的编码器增量，环形存放
    pub deltas: [i64; SPEED_WINDOW],
    /// 本周期使用的控制间隔（秒）
    pub interval: f64,
}

/// 控制周期间隔估计
///
/// 间隔 = 自基准时刻以来的总时长 / 周期数。第一个周期没有历史，使用种子值。
#[derive(Debug, Clone)]
pub struct IntervalEstimator {
    interval: f64,
    start: Option<Instant>,
    ticks: u64,
}

impl IntervalEstimator {
    pub fn new(seed: f64) -> Self {
        Self {
            interval: seed,
            start: None,
            ticks: 0,
        }
    }

    /// 记录一个周期，返回本周期使用的间隔（秒）
    pub fn update(&mut self, now: Instant) -> f64 {
        match self.start {
            None => self.start = Some(now),
            Some(start) => {
                let measured =
                    now.saturating_duration_since(start).as_secs_f64() / self.ticks as f64;
                // 同一时刻的重复调用保持上次的值
                if measured > 0.0 {
                    self.interval = measured;
                }
            },
        }
        self.ticks += 1;
        self.interval
    }

    /// 重新建立基准（暂停恢复后），保留最近一次的估计作为种子
    pub fn rebase(&mut self) {
        self.start = None;
        self.ticks = 0;
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }
}

/// 平衡状态估计器
#[derive(Debug, Clone)]
pub struct BalanceEstimator {
    gyro: GyroOffsetTracker,
    timing: IntervalEstimator,
    state: BalanceState,
    previous_sum: Option<i64>,
    cursor: usize,
}

impl BalanceEstimator {
    pub fn new(gyro: GyroOffsetTracker, seed_interval: f64) -> Self {
        let state = BalanceState {
            gyro_offset: gyro.offset(),
            interval: seed_interval,
            ..Default::default()
        };
        Self {
            gyro,
            timing: IntervalEstimator::new(seed_interval),
            state,
            previous_sum: None,
            cursor: 0,
        }
    }

    /// 推进一个周期
    ///
    /// # 参数
    ///
    /// - `raw_gyro`: 本周期陀螺原始读数；`None` 表示读取失败，本周期不更新零偏和倾角
    /// - `left` / `right`: 编码器计数（读取失败时由调用方传入上一次的值）
    ///
    /// 第一次调用把编码器之和记为基准，位置从 0 开始。
    pub fn update(
        &mut self,
        now: Instant,
        raw_gyro: Option<f64>,
        left: i64,
        right: i64,
    ) -> &BalanceState {
        // 间隔先于积分更新：本周期的积分使用本周期的间隔
        let interval = self.timing.update(now);
        self.state.interval = interval;

        match raw_gyro {
            Some(raw) => {
                let filtered = self.gyro.update(raw);
                self.state.angular_velocity = filtered;
                self.state.gyro_offset = self.gyro.offset();
                self.state.tilt_angle += filtered * interval;
            },
            None => self.state.angular_velocity = 0.0,
        }

        let sum = left + right;
        let delta = sum - self.previous_sum.unwrap_or(sum);
        self.previous_sum = Some(sum);

        self.state.position += delta as f64;
        self.state.deltas[self.cursor] = delta;
        self.cursor = (self.cursor + 1) % SPEED_WINDOW;
        let window: i64 = self.state.deltas.iter().sum();
        self.state.speed = window as f64 / (SPEED_WINDOW as f64 * interval);

        &self.state
    }

    /// 驱动需求：把位置参考按速率向后移动，位置项于是推动车体前进
    pub fn apply_drive(&mut self, drive: f64) {
        self.state.position -= drive * self.state.interval;
    }

    /// 暂停恢复后重建时间基准，并清空速度窗口
    pub fn rebase(&mut self, left: i64, right: i64) {
        self.timing.rebase();
        self.previous_sum = Some(left + right);
        self.state.deltas = [0; SPEED_WINDOW];
        self.state.speed = 0.0;
    }

    pub fn state(&self) -> &BalanceState {
        &self.state
    }
}

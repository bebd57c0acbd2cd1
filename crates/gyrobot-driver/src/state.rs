//! 线程间共享状态
//!
//! 平衡线程是电机指令的唯一写者；调节线程只写 [`DriveDemand`]，
//! 并从 [`BalanceSnapshot`] 读取编码器。两者都通过 `ArcSwap` 无锁交换。

use crate::phase::{AtomicBalancePhase, BalancePhase};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 驱动需求（编码器度/秒）
///
/// - `drive`: 两轮速率之和
/// - `steer`: 两轮速率之差（左减右）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveDemand {
    pub drive: f64,
    pub steer: f64,
}

impl DriveDemand {
    /// 原地保持
    pub const IDLE: Self = Self {
        drive: 0.0,
        steer: 0.0,
    };

    /// 从两轮速度（±100 为满速）换算
    ///
    /// `control_speed` 为满速对应的编码器速率。
    pub fn from_wheels(left: f64, right: f64, control_speed: f64) -> Self {
        Self {
            drive: (left + right) * control_speed / 200.0,
            steer: (left - right) * control_speed / 200.0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.drive == 0.0 && self.steer == 0.0
    }
}

/// 平衡线程每个周期发布的快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSnapshot {
    pub left_encoder: i64,
    pub right_encoder: i64,
    /// 带符号功率（前进为正）
    pub left_power: i32,
    pub right_power: i32,
    pub tilt_angle: f64,
    pub angular_velocity: f64,
    pub gyro_offset: f64,
    /// 当前控制间隔估计（秒）
    pub tick_interval: f64,
    /// 已执行的平衡周期数
    pub tick_count: u64,
    /// 发布时刻（构造时的初始快照为 `None`）
    pub timestamp: Option<Instant>,
}

/// 会话事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// 功率持续饱和，判定跌倒，电机已滑行
    Fallen { saturated_for: Duration },
    /// 显式关闭，电机已滑行
    Stopped,
}

/// 平衡线程与调节线程共享的上下文
#[derive(Debug)]
pub struct BalanceContext {
    demand: ArcSwap<DriveDemand>,
    snapshot: ArcSwap<BalanceSnapshot>,
    phase: AtomicBalancePhase,
    paused: AtomicBool,
    control_speed: f64,
}

impl BalanceContext {
    /// # 参数
    ///
    /// - `initial`: 构造时读到的编码器等初始状态，平衡线程第一次发布前由它顶替
    /// - `control_speed`: `wheel_driver` 的满速编码器速率
    pub fn new(initial: BalanceSnapshot, control_speed: f64) -> Self {
        Self {
            demand: ArcSwap::from_pointee(DriveDemand::IDLE),
            snapshot: ArcSwap::from_pointee(initial),
            phase: AtomicBalancePhase::new(BalancePhase::Calibrating),
            paused: AtomicBool::new(false),
            control_speed,
        }
    }

    pub fn demand(&self) -> DriveDemand {
        **self.demand.load()
    }

    pub fn set_demand(&self, demand: DriveDemand) {
        self.demand.store(Arc::new(demand));
    }

    /// 两轮速度（±100 为满速）转换为驱动需求并写入
    pub fn wheel_driver(&self, left: f64, right: f64) {
        self.set_demand(DriveDemand::from_wheels(left, right, self.control_speed));
    }

    pub fn snapshot(&self) -> Arc<BalanceSnapshot> {
        self.snapshot.load_full()
    }

    /// 当前编码器读数 `(left, right)`
    pub fn encoders(&self) -> (i64, i64) {
        let snapshot = self.snapshot.load();
        (snapshot.left_encoder, snapshot.right_encoder)
    }

    pub fn publish(&self, snapshot: BalanceSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn phase(&self) -> BalancePhase {
        self.phase.get(Ordering::Acquire)
    }

    pub fn phase_cell(&self) -> &AtomicBalancePhase {
        &self.phase
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn control_speed(&self) -> f64 {
        self.control_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_driver_conversion() {
        let demand = DriveDemand::from_wheels(-50.0, -50.0, 600.0);
        assert_eq!(demand.drive, -300.0);
        assert_eq!(demand.steer, 0.0);

        let demand = DriveDemand::from_wheels(50.0, -50.0, 600.0);
        assert_eq!(demand.drive, 0.0);
        assert_eq!(demand.steer, 300.0);

        assert!(DriveDemand::IDLE.is_idle());
        assert!(!demand.is_idle());
    }

    #[test]
    fn test_context_demand_and_snapshot() {
        let ctx = BalanceContext::new(
            BalanceSnapshot {
                left_encoder: 10,
                right_encoder: -3,
                ..Default::default()
            },
            600.0,
        );
        assert_eq!(ctx.encoders(), (10, -3));
        assert_eq!(ctx.demand(), DriveDemand::IDLE);
        assert_eq!(ctx.phase(), BalancePhase::Calibrating);

        ctx.wheel_driver(5.0, -5.0);
        assert_eq!(ctx.demand().steer, 30.0);

        ctx.publish(BalanceSnapshot {
            left_encoder: 11,
            right_encoder: -4,
            tick_count: 1,
            ..Default::default()
        });
        assert_eq!(ctx.encoders(), (11, -4));
        assert_eq!(ctx.snapshot().tick_count, 1);
    }

    #[test]
    fn test_pause_flag() {
        let ctx = BalanceContext::new(BalanceSnapshot::default(), 600.0);
        assert!(!ctx.is_paused());
        ctx.set_paused(true);
        assert!(ctx.is_paused());
    }
}

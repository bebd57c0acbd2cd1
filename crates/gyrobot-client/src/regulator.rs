//! 运动调节
//!
//! 调节线程按周期读取平衡线程发布的编码器快照：保持模式下计算回正修正，
//! 运动模式下检测两轮是否越过目标。它只写驱动需求，从不直接操作电机。

use crate::geometry::WheelGeometry;
use crate::motion::MotionPlan;
use crate::movement::Move;
use crate::pilot_core::PilotCore;
use gyrobot_driver::{PeriodicTimer, TickWait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, trace};

/// 一次调节的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegulatorAction {
    /// 保持模式，两轮修正速度
    Hold { left: f64, right: f64 },
    /// 运动中，尚未到达
    Moving,
    /// 本次调节完成了运动（已切换到保持）
    Completed(Move),
}

/// 对运动单元格执行一次调节（调用方持有锁）
pub fn regulate(
    plan: &mut MotionPlan,
    geometry: &WheelGeometry,
    left: i64,
    right: i64,
    max_correction: f64,
) -> RegulatorAction {
    if !plan.is_moving() {
        let (l, r) = plan.hold_correction(left, right, max_correction);
        return RegulatorAction::Hold { left: l, right: r };
    }
    match plan.complete(geometry, left, right) {
        Some(done) => RegulatorAction::Completed(done),
        None => RegulatorAction::Moving,
    }
}

/// 调节线程主循环
///
/// 会话结束（`is_running` 清除或关闭通道断开）时退出，并唤醒所有等待运动完成的调用方。
pub fn regulator_loop(core: Arc<PilotCore>, is_running: Arc<AtomicBool>, mut timer: PeriodicTimer) {
    info!("Motion regulator started (period {:?})", timer.period());
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Motion regulator: is_running cleared");
            break;
        }
        if !core.balance().is_paused() {
            core.regulate_once();
        }
        if timer.wait() == TickWait::Cancelled {
            trace!("Motion regulator: shutdown signal received");
            break;
        }
    }
    core.wake_waiters();
    info!("Motion regulator exited");
}

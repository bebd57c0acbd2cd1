//! 平衡线程主循环
//!
//! 周期等待使用关闭通道的 `recv_timeout`：超时即正常的一个周期，
//! 收到消息或通道断开即退出。醒来晚了只会让这个周期晚一点执行。

use crate::controller::{BalanceController, TickOutcome};
use crate::phase::BalancePhase;
use crate::state::{BalanceContext, SessionEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

/// 一次周期等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickWait {
    /// 到达下一个周期
    Tick,
    /// 关闭信号（消息或通道断开）
    Cancelled,
}

/// 可中断的周期定时器
///
/// 以固定的截止时刻推进；错过截止时刻时从当前时刻重新起算，不补发积压的周期。
#[derive(Debug)]
pub struct PeriodicTimer {
    period: Duration,
    next: Instant,
    shutdown: Receiver<()>,
}

impl PeriodicTimer {
    pub fn new(period: Duration, shutdown: Receiver<()>) -> Self {
        Self {
            period,
            next: Instant::now() + period,
            shutdown,
        }
    }

    /// 等到下一个周期，或者被关闭信号打断
    pub fn wait(&mut self) -> TickWait {
        let remaining = self.next.saturating_duration_since(Instant::now());
        match self.shutdown.recv_timeout(remaining) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return TickWait::Cancelled,
        }

        let now = Instant::now();
        self.next += self.period;
        if self.next < now {
            trace!("Periodic tick late by {:?}", now - self.next);
            self.next = now + self.period;
        }
        TickWait::Tick
    }

    /// 从当前时刻重新起算
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.period;
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// 平衡线程主循环
///
/// # 退出路径
///
/// - 跌倒：控制器已让电机滑行，阶段置为 `Fallen`，发送 `SessionEvent::Fallen`
/// - `is_running` 被清除或关闭信号：电机滑行，阶段置为 `Stopped`，发送 `SessionEvent::Stopped`
///
/// 两种情况都会清除 `is_running`，调节线程随之退出。
pub fn balance_loop(
    mut controller: BalanceController,
    ctx: Arc<BalanceContext>,
    is_running: Arc<AtomicBool>,
    events: Sender<SessionEvent>,
    mut timer: PeriodicTimer,
) {
    if !ctx.phase_cell().compare_exchange(
        BalancePhase::Calibrating,
        BalancePhase::Balancing,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        warn!("Balance loop started in phase {:?}, exiting", ctx.phase());
        is_running.store(false, Ordering::Release);
        return;
    }
    info!("Balance loop started (period {:?})", timer.period());

    let mut paused = false;
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Balance loop: is_running cleared");
            break;
        }

        if ctx.is_paused() {
            // 每个周期都尝试，直到两个电机都确认滑行
            let floating = controller.coast();
            if !paused {
                paused = true;
                if floating {
                    info!("Balance loop paused, motors floating");
                } else {
                    warn!("Balance loop paused, retrying motor coast");
                }
            }
        } else {
            if paused {
                controller.rebase(Instant::now());
                timer.reset();
                paused = false;
                info!("Balance loop resumed");
            }

            if let TickOutcome::Fallen { saturated_for } = controller.step(Instant::now(), &ctx) {
                ctx.phase_cell().terminate(BalancePhase::Fallen);
                is_running.store(false, Ordering::Release);
                if events.send(SessionEvent::Fallen { saturated_for }).is_err() {
                    trace!("No listener for fall event");
                }
                error!("Balance loop stopped: vehicle fell");
                return;
            }
        }

        if timer.wait() == TickWait::Cancelled {
            trace!("Balance loop: shutdown signal received");
            break;
        }
    }

    controller.coast();
    is_running.store(false, Ordering::Release);
    ctx.phase_cell().terminate(BalancePhase::Stopped);
    if events.send(SessionEvent::Stopped).is_err() {
        trace!("No listener for stop event");
    }
    info!("Balance loop exited, motors floating");
}

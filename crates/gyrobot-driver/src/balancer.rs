//! 平衡会话句柄
//!
//! [`Balancer`] 拥有平衡线程：启动时把控制器移入线程，关闭（或 `Drop`）时
//! 清除运行标志、断开关闭通道并在有限时间内 join。

use crate::controller::BalanceController;
use crate::error::DriverError;
use crate::phase::BalancePhase;
use crate::pipeline::{PeriodicTimer, balance_loop};
use crate::state::{BalanceContext, BalanceSnapshot, DriveDemand, SessionEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// 线程 join 的默认超时
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 join
///
/// 由一个看门狗线程执行真正的 `join()`，调用方在通道上限时等待结果。
/// 超时后看门狗线程继续等待目标线程，不会阻塞调用方。
pub trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = bounded(1);
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 平衡会话句柄
pub struct Balancer {
    ctx: Arc<BalanceContext>,
    is_running: Arc<AtomicBool>,
    shutdown_tx: Option<Sender<()>>,
    shutdown_rx: Receiver<()>,
    events_rx: Receiver<SessionEvent>,
    balance_thread: Option<JoinHandle<()>>,
}

impl Balancer {
    /// 启动平衡线程
    ///
    /// 控制器必须已经完成陀螺仪校准。
    pub fn start(controller: BalanceController) -> Result<Self, DriverError> {
        let config = controller.config().clone();
        let initial = BalanceSnapshot {
            timestamp: None,
            ..controller.snapshot(Instant::now())
        };

        let ctx = Arc::new(BalanceContext::new(initial, config.control_speed));
        let is_running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (events_tx, events_rx) = unbounded();

        let timer = PeriodicTimer::new(config.tick_period(), shutdown_rx.clone());
        let ctx_clone = ctx.clone();
        let is_running_clone = is_running.clone();

        let balance_thread = std::thread::Builder::new()
            .name("gyrobot-balance".into())
            .spawn(move || {
                balance_loop(controller, ctx_clone, is_running_clone, events_tx, timer);
            })
            .map_err(|e| DriverError::BalanceThread(e.to_string()))?;

        info!("Balancer started");
        Ok(Self {
            ctx,
            is_running,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx,
            events_rx,
            balance_thread: Some(balance_thread),
        })
    }

    /// 共享上下文（驱动需求、快照、阶段、暂停标志）
    pub fn context(&self) -> Arc<BalanceContext> {
        self.ctx.clone()
    }

    /// 运行标志，配套线程用它感知会话结束
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.is_running.clone()
    }

    /// 关闭信号接收端，配套线程用它做可中断的周期等待
    pub fn shutdown_signal(&self) -> Receiver<()> {
        self.shutdown_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> BalancePhase {
        self.ctx.phase()
    }

    pub fn snapshot(&self) -> Arc<BalanceSnapshot> {
        self.ctx.snapshot()
    }

    pub fn demand(&self) -> DriveDemand {
        self.ctx.demand()
    }

    /// 写入驱动需求
    pub fn set_demand(&self, demand: DriveDemand) -> Result<(), DriverError> {
        self.ensure_running()?;
        self.ctx.set_demand(demand);
        Ok(())
    }

    /// 两轮速度（±100 为满速）换算为驱动需求并写入
    pub fn wheel_driver(&self, left: f64, right: f64) -> Result<(), DriverError> {
        self.ensure_running()?;
        self.ctx.wheel_driver(left, right);
        Ok(())
    }

    /// 暂停平衡：下一个周期边界电机滑行，不再估计状态
    pub fn pause(&self) -> Result<(), DriverError> {
        self.ensure_running()?;
        self.ctx.set_paused(true);
        debug!("Balance pause requested");
        Ok(())
    }

    /// 恢复平衡
    pub fn resume(&self) -> Result<(), DriverError> {
        self.ensure_running()?;
        self.ctx.set_paused(false);
        debug!("Balance resume requested");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.is_paused()
    }

    /// 会话事件接收端
    ///
    /// 所有克隆共享同一个队列，每个事件只会被其中一个接收端取走。
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// 关闭平衡线程（可重复调用）
    ///
    /// 返回时电机已经滑行，阶段为 `Stopped`（跌倒后关闭则保持 `Fallen`）。
    pub fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::Release);
        // 断开关闭通道，打断正在进行的周期等待
        self.shutdown_tx.take();

        if let Some(handle) = self.balance_thread.take() {
            if let Err(_e) = handle.join_timeout(JOIN_TIMEOUT) {
                error!(
                    "Balance thread panicked or failed to shut down within {:?}",
                    JOIN_TIMEOUT
                );
            } else {
                info!("Balancer shut down (phase {:?})", self.ctx.phase());
            }
        }
        self.ctx.phase_cell().terminate(BalancePhase::Stopped);
    }

    fn ensure_running(&self) -> Result<(), DriverError> {
        if self.is_running() && !self.ctx.phase().is_terminal() {
            Ok(())
        } else {
            Err(DriverError::SessionEnded)
        }
    }
}

impl Drop for Balancer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("phase", &self.phase())
            .field("is_running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceConfig, CalibrationConfig};
    use crate::controller::COAST_ATTEMPTS;
    use gyrobot_hal::MotorDirection;
    use gyrobot_hal::mock::{SimulatedGyro, SimulatedMotor};

    fn start(gyro: &SimulatedGyro, left: &SimulatedMotor, right: &SimulatedMotor) -> Balancer {
        let config = BalanceConfig {
            calibration: CalibrationConfig {
                samples: 10,
                sample_interval_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let controller = BalanceController::new(
            Box::new(left.clone()),
            Box::new(right.clone()),
            Box::new(gyro.clone()),
            config,
        )
        .unwrap();
        Balancer::start(controller).unwrap()
    }

    fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_join_timeout_ok() {
        let handle = spawn(|| std::thread::sleep(Duration::from_millis(10)));
        assert!(handle.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_timeout_expires() {
        let handle = spawn(|| std::thread::sleep(Duration::from_millis(300)));
        assert!(handle.join_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_shutdown_floats_motors() {
        let (gyro, left, right) = (SimulatedGyro::new(), SimulatedMotor::new(), SimulatedMotor::new());
        let mut balancer = start(&gyro, &left, &right);
        let events = balancer.events();

        assert!(wait_for(|| balancer.snapshot().tick_count > 5, Duration::from_secs(2)));
        assert_eq!(balancer.phase(), BalancePhase::Balancing);

        balancer.shutdown();
        assert!(!balancer.is_running());
        assert_eq!(balancer.phase(), BalancePhase::Stopped);
        assert_eq!(left.direction(), MotorDirection::Coast);
        assert_eq!(right.direction(), MotorDirection::Coast);
        assert_eq!(events.try_recv(), Ok(SessionEvent::Stopped));

        assert!(matches!(
            balancer.wheel_driver(10.0, 10.0),
            Err(DriverError::SessionEnded)
        ));
        // 重复关闭无副作用
        balancer.shutdown();
    }

    #[test]
    fn test_fall_ends_session() {
        let (gyro, left, right) = (SimulatedGyro::new(), SimulatedMotor::new(), SimulatedMotor::new());
        let balancer = start(&gyro, &left, &right);
        let events = balancer.events();
        gyro.set_rate(200.0);

        let event = events.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(matches!(event, SessionEvent::Fallen { .. }));
        assert!(wait_for(|| !balancer.is_running(), Duration::from_secs(1)));
        assert_eq!(balancer.phase(), BalancePhase::Fallen);
        assert_eq!(left.coast_count(), 1);
        assert_eq!(right.coast_count(), 1);
        assert!(balancer.pause().is_err());

        drop(balancer);
        assert_eq!(left.coast_count(), 1);
    }

    #[test]
    fn test_fall_with_failing_coast_still_floats_motor() {
        let (gyro, left, right) = (SimulatedGyro::new(), SimulatedMotor::new(), SimulatedMotor::new());
        let balancer = start(&gyro, &left, &right);
        let events = balancer.events();
        left.fail_next_coasts(COAST_ATTEMPTS);
        gyro.set_rate(200.0);

        let event = events.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(matches!(event, SessionEvent::Fallen { .. }));
        assert!(wait_for(
            || left.direction() == MotorDirection::Coast,
            Duration::from_secs(1)
        ));
        assert_eq!(left.coast_count(), 1);
        assert_eq!(right.coast_count(), 1);
    }

    #[test]
    fn test_pause_retries_failing_coast() {
        let (gyro, left, right) = (SimulatedGyro::new(), SimulatedMotor::new(), SimulatedMotor::new());
        let balancer = start(&gyro, &left, &right);
        gyro.set_rate(5.0);
        assert!(wait_for(
            || left.direction() == MotorDirection::Forward,
            Duration::from_secs(1)
        ));

        left.fail_next_coasts(COAST_ATTEMPTS * 2);
        balancer.pause().unwrap();
        assert!(wait_for(
            || left.direction() == MotorDirection::Coast,
            Duration::from_secs(1)
        ));
        assert_eq!(right.direction(), MotorDirection::Coast);
        assert_eq!(right.coast_count(), 1);
    }

    #[test]
    fn test_pause_floats_and_resume_continues() {
        let (gyro, left, right) = (SimulatedGyro::new(), SimulatedMotor::new(), SimulatedMotor::new());
        let balancer = start(&gyro, &left, &right);

        balancer.pause().unwrap();
        assert!(wait_for(|| left.coast_count() == 1, Duration::from_secs(1)));
        let ticks = balancer.snapshot().tick_count;
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(balancer.snapshot().tick_count, ticks);

        balancer.resume().unwrap();
        assert!(wait_for(
            || balancer.snapshot().tick_count > ticks + 3,
            Duration::from_secs(1)
        ));
        assert_eq!(balancer.phase(), BalancePhase::Balancing);
    }
}

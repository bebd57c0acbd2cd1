//! # Segway Pilot
//!
//! 面向用户的运动控制接口。`SegwayPilot` 拥有平衡线程（经由 `Balancer`）和调节线程，
//! 两者共享同一个 [`PilotCore`]。
//!
//! # 阻塞与立即返回
//!
//! 运动指令的 `immediate = false` 会阻塞到运动完成（或会话结束）；
//! `immediate = true` 写入目标后立即返回，之后用 `is_moving()` 或观察者跟踪进度。
//! 两种方式返回前都会按 `move_delay` 静置。

use crate::config::PilotConfig;
use crate::pilot_core::PilotCore;
use crate::error::PilotError;
use crate::geometry::WheelGeometry;
use crate::motion::{MotionMode, MotionTarget};
use crate::movement::Move;
use crate::observer::MoveObserver;
use crate::regulator::regulator_loop;
use crossbeam_channel::Receiver;
use gyrobot_driver::{
    BalanceController, BalancePhase, BalanceSnapshot, Balancer, JOIN_TIMEOUT, JoinTimeout,
    PeriodicTimer, SessionEvent,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

/// 观察者回调拿到的只读句柄
///
/// 可以查询状态，也可以 `stop()`；不提供阻塞的运动指令，避免在调节线程上等待自己。
#[derive(Clone)]
pub struct PilotHandle {
    core: Arc<PilotCore>,
}

impl PilotHandle {
    pub(crate) fn new(core: Arc<PilotCore>) -> Self {
        Self { core }
    }

    pub fn is_moving(&self) -> bool {
        self.core.is_moving()
    }

    pub fn mode(&self) -> MotionMode {
        self.core.mode()
    }

    pub fn target(&self) -> MotionTarget {
        self.core.target()
    }

    pub fn phase(&self) -> BalancePhase {
        self.core.phase()
    }

    pub fn snapshot(&self) -> Arc<BalanceSnapshot> {
        self.core.balance().snapshot()
    }

    pub fn travel_speed(&self) -> f64 {
        self.core.travel_speed()
    }

    pub fn geometry(&self) -> WheelGeometry {
        *self.core.geometry()
    }

    /// 停止当前运动
    pub fn stop(&self) -> Option<Move> {
        self.core.stop()
    }
}

impl std::fmt::Debug for PilotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotHandle")
            .field("target", &self.target())
            .field("phase", &self.phase())
            .finish()
    }
}

/// 两轮自平衡车运动控制
///
/// 通过 [`PilotBuilder`](crate::PilotBuilder) 创建。`Drop` 时关闭两个线程并让电机滑行。
pub struct SegwayPilot {
    core: Arc<PilotCore>,
    balancer: Balancer,
    regulator_thread: Option<JoinHandle<()>>,
}

impl SegwayPilot {
    /// 启动平衡线程和调节线程
    ///
    /// 控制器必须已经完成陀螺仪校准；保持点为控制器当前的编码器读数。
    pub fn start(controller: BalanceController, config: PilotConfig) -> Result<Self, PilotError> {
        config.validate()?;
        let geometry = WheelGeometry::new(config.balance.wheel_diameter, config.track_width)?;

        let balancer = Balancer::start(controller)?;
        let core = PilotCore::new(balancer.context(), geometry, &config);

        let timer = PeriodicTimer::new(config.regulator_period(), balancer.shutdown_signal());
        let is_running = balancer.running_flag();
        let core_clone = core.clone();
        let regulator_thread = std::thread::Builder::new()
            .name("gyrobot-regulator".into())
            .spawn(move || regulator_loop(core_clone, is_running, timer))
            .map_err(|e| PilotError::Thread(e.to_string()))?;

        info!(
            "Segway pilot started: wheel diameter {}, track width {}",
            geometry.wheel_diameter(),
            geometry.track_width()
        );
        Ok(Self {
            core,
            balancer,
            regulator_thread: Some(regulator_thread),
        })
    }

    /// 观察者使用的句柄
    pub fn handle(&self) -> PilotHandle {
        self.core.handle()
    }

    /// 直线行驶 `distance`（负值后退，`±∞` 不设终点）
    pub fn travel(&self, distance: f64, immediate: bool) -> Result<(), PilotError> {
        self.core.travel(distance)?;
        self.finish_command(immediate)
    }

    /// 一直向前，直到 `stop()` 或下一个运动指令
    pub fn forward(&self) -> Result<(), PilotError> {
        self.travel(f64::INFINITY, true)
    }

    /// 一直后退
    pub fn backward(&self) -> Result<(), PilotError> {
        self.travel(f64::NEG_INFINITY, true)
    }

    /// 原地旋转 `degrees`（正值向左）
    pub fn rotate(&self, degrees: f64, immediate: bool) -> Result<(), PilotError> {
        self.core.rotate(degrees)?;
        self.finish_command(immediate)
    }

    /// 沿半径 `radius` 的圆弧转过 `angle` 度
    ///
    /// 正半径圆心在左侧；`angle` 负值沿圆弧后退。半径为 0 返回 `InvalidArgument`。
    pub fn arc(&self, radius: f64, angle: f64, immediate: bool) -> Result<(), PilotError> {
        self.core.arc(radius, angle)?;
        self.finish_command(immediate)
    }

    /// 沿半径 `radius` 的圆弧一直向前
    pub fn arc_forward(&self, radius: f64) -> Result<(), PilotError> {
        self.arc(radius, f64::INFINITY, true)
    }

    /// 沿半径 `radius` 的圆弧一直后退
    pub fn arc_backward(&self, radius: f64) -> Result<(), PilotError> {
        self.arc(radius, f64::NEG_INFINITY, true)
    }

    /// 沿半径 `radius` 的圆弧行驶 `distance`
    pub fn travel_arc(&self, radius: f64, distance: f64, immediate: bool) -> Result<(), PilotError> {
        self.core.travel_arc(radius, distance)?;
        self.finish_command(immediate)
    }

    /// 以转向率转过 `angle` 度
    ///
    /// # 参数
    ///
    /// - `turn_rate`: -200..=200，正值左轮在内侧；0 为直线前进，±200 为原地旋转
    /// - `angle`: 车头转过的角度，负值沿圆弧后退；0 时不动
    pub fn steer(&self, turn_rate: f64, angle: f64, immediate: bool) -> Result<(), PilotError> {
        self.core.steer(turn_rate, angle)?;
        self.finish_command(immediate)
    }

    /// 停止当前运动，原地保持
    ///
    /// # 返回
    ///
    /// 被中断的运动；已经在保持时为 `None`
    pub fn stop(&self) -> Option<Move> {
        self.core.stop()
    }

    /// 直接设置两轮速度（±100 为满速，编码器增大方向为正）
    pub fn wheel_driver(&self, left: f64, right: f64) -> Result<(), PilotError> {
        self.core.wheel_driver(left, right)
    }

    pub fn is_moving(&self) -> bool {
        self.core.is_moving()
    }

    pub fn mode(&self) -> MotionMode {
        self.core.mode()
    }

    pub fn target(&self) -> MotionTarget {
        self.core.target()
    }

    pub fn set_travel_speed(&self, speed: f64) -> Result<(), PilotError> {
        self.core.set_travel_speed(speed)
    }

    pub fn travel_speed(&self) -> f64 {
        self.core.travel_speed()
    }

    pub fn max_travel_speed(&self) -> f64 {
        self.core.max_travel_speed()
    }

    pub fn set_min_radius(&self, radius: f64) -> Result<(), PilotError> {
        self.core.set_min_radius(radius)
    }

    pub fn min_radius(&self) -> f64 {
        self.core.min_radius()
    }

    /// 每个运动指令之后的静置时间
    pub fn set_move_delay(&self, delay: Duration) {
        self.core.set_move_delay(delay);
    }

    pub fn add_observer(&self, observer: Arc<dyn MoveObserver>) {
        self.core.add_observer(observer);
    }

    pub fn geometry(&self) -> WheelGeometry {
        *self.core.geometry()
    }

    /// 暂停平衡（电机滑行），车体需要被扶住或放倒
    pub fn pause(&self) -> Result<(), PilotError> {
        self.balancer
            .pause()
            .map_err(|_| PilotError::SessionEnded(self.phase()))
    }

    pub fn resume(&self) -> Result<(), PilotError> {
        self.balancer
            .resume()
            .map_err(|_| PilotError::SessionEnded(self.phase()))
    }

    pub fn is_paused(&self) -> bool {
        self.balancer.is_paused()
    }

    pub fn phase(&self) -> BalancePhase {
        self.balancer.phase()
    }

    pub fn snapshot(&self) -> Arc<BalanceSnapshot> {
        self.balancer.snapshot()
    }

    /// 会话事件（跌倒、关闭）
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.balancer.events()
    }

    /// 关闭两个线程，电机滑行（可重复调用）
    pub fn shutdown(&mut self) {
        self.balancer.shutdown();
        if let Some(handle) = self.regulator_thread.take()
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Regulator thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }
    }

    fn finish_command(&self, immediate: bool) -> Result<(), PilotError> {
        if !immediate {
            self.core.wait_until_settled()?;
        }
        let delay = self.core.move_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }
}

impl Drop for SegwayPilot {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SegwayPilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegwayPilot")
            .field("core", &self.core)
            .field("balancer", &self.balancer)
            .finish()
    }
}

//! 运动控制核心
//!
//! [`PilotCore`] 集中保存运动单元格、观察者和运动参数，并实现所有运动指令。
//! 它本身不创建线程，`SegwayPilot` 为它配上平衡线程和调节线程；
//! 测试也可以直接用它和 `BalanceController` 按步交替驱动。
//!
//! # 锁
//!
//! - 运动单元格（`Mutex<MotionPlan>`）：计划、完成判定和驱动需求的写入都在锁内完成
//! - 观察者回调一律在锁外执行

use crate::config::{PilotConfig, validate_speed};
use crate::error::PilotError;
use crate::geometry::{MAX_TURN_RATE, WheelGeometry};
use crate::motion::{MotionMode, MotionPlan, MotionTarget, PlannedMove};
use crate::movement::Move;
use crate::observer::{MoveObserver, ObserverRegistry};
use crate::pilot::PilotHandle;
use crate::regulator::{RegulatorAction, regulate};
use gyrobot_driver::{BalanceContext, BalancePhase, DriveDemand};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
struct MotionSettings {
    travel_speed: f64,
    max_travel_speed: f64,
    min_radius: f64,
    move_delay: Duration,
}

/// 运动控制核心
pub struct PilotCore {
    balance: Arc<BalanceContext>,
    geometry: WheelGeometry,
    motion: Mutex<MotionPlan>,
    settled: Condvar,
    observers: RwLock<ObserverRegistry>,
    settings: RwLock<MotionSettings>,
    /// `wheel_driver` 直接驱动中，调节器不做保持修正
    manual: AtomicBool,
    hold_max_correction: f64,
    regulator_period: Duration,
}

impl PilotCore {
    /// 以当前编码器快照为保持点创建
    pub fn new(
        balance: Arc<BalanceContext>,
        geometry: WheelGeometry,
        config: &PilotConfig,
    ) -> Arc<Self> {
        let (left, right) = balance.encoders();
        Arc::new(Self {
            balance,
            geometry,
            motion: Mutex::new(MotionPlan::holding(left, right)),
            settled: Condvar::new(),
            observers: RwLock::new(ObserverRegistry::new()),
            settings: RwLock::new(MotionSettings {
                travel_speed: config.travel_speed,
                max_travel_speed: config.max_travel_speed,
                min_radius: config.min_radius,
                move_delay: config.move_delay(),
            }),
            manual: AtomicBool::new(false),
            hold_max_correction: config.hold_max_correction,
            regulator_period: config.regulator_period(),
        })
    }

    pub fn handle(self: &Arc<Self>) -> PilotHandle {
        PilotHandle::new(self.clone())
    }

    pub fn balance(&self) -> &BalanceContext {
        &self.balance
    }

    pub fn geometry(&self) -> &WheelGeometry {
        &self.geometry
    }

    pub fn phase(&self) -> BalancePhase {
        self.balance.phase()
    }

    // ==================== 运动指令 ====================

    /// 直线行驶（`±∞` 不设终点）
    pub fn travel(self: &Arc<Self>, distance: f64) -> Result<(), PilotError> {
        if distance.is_nan() {
            return Err(PilotError::invalid("travel distance is NaN"));
        }
        self.begin(|plan, geometry, speed| plan.plan_travel(geometry, distance, speed))
    }

    /// 原地旋转，正值向左
    pub fn rotate(self: &Arc<Self>, degrees: f64) -> Result<(), PilotError> {
        if !degrees.is_finite() {
            return Err(PilotError::invalid(format!(
                "rotation angle must be finite, got {}",
                degrees
            )));
        }
        self.begin(|plan, geometry, speed| plan.plan_rotate(geometry, degrees, speed))
    }

    /// 沿半径 `radius` 的圆弧转过 `angle` 度
    ///
    /// 正半径圆心在左侧；半径 `±∞` 为直线行驶；`angle` 为 `±∞` 时不设终点。
    /// 有限半径的绝对值必须不小于 [`min_radius`](Self::min_radius)。
    pub fn arc(self: &Arc<Self>, radius: f64, angle: f64) -> Result<(), PilotError> {
        if radius.is_nan() || radius == 0.0 {
            return Err(PilotError::invalid(format!(
                "arc radius must be non-zero, got {}",
                radius
            )));
        }
        if angle.is_nan() {
            return Err(PilotError::invalid("arc angle is NaN"));
        }
        if radius.is_infinite() {
            let direction = if angle < 0.0 { -1.0 } else { 1.0 };
            return self.travel(direction * f64::INFINITY);
        }
        let min_radius = self.min_radius();
        if radius.abs() < min_radius {
            return Err(PilotError::invalid(format!(
                "arc radius {} is below the minimum radius {}",
                radius, min_radius
            )));
        }
        let turn_rate = self.geometry.turn_rate_for_radius(radius);
        if turn_rate == 0.0 && angle != 0.0 {
            // 半径过大时转向率下溢为 0，按弧长直线行驶
            return self.travel(radius.abs() * angle.to_radians());
        }
        self.steer(turn_rate, angle)
    }

    /// 以转向率 `turn_rate`（-200..=200，正值左轮在内侧）转过 `angle` 度
    ///
    /// `angle` 为 0 时不动；`turn_rate` 为 0 时直线前进（不设终点）。
    pub fn steer(self: &Arc<Self>, turn_rate: f64, angle: f64) -> Result<(), PilotError> {
        if turn_rate.is_nan() || turn_rate.abs() > MAX_TURN_RATE {
            return Err(PilotError::invalid(format!(
                "turn rate must be within [-200, 200], got {}",
                turn_rate
            )));
        }
        if angle.is_nan() {
            return Err(PilotError::invalid("steer angle is NaN"));
        }
        if angle == 0.0 {
            self.ensure_active()?;
            return Ok(());
        }
        if turn_rate == 0.0 {
            return self.travel(f64::INFINITY);
        }
        self.begin(|plan, geometry, speed| plan.plan_arc(geometry, turn_rate, angle, speed))
    }

    /// 沿半径 `radius` 的圆弧行驶 `distance`（正值向前）
    pub fn travel_arc(self: &Arc<Self>, radius: f64, distance: f64) -> Result<(), PilotError> {
        if radius.is_nan() || radius == 0.0 {
            return Err(PilotError::invalid(format!(
                "arc radius must be non-zero, got {}",
                radius
            )));
        }
        if distance.is_nan() {
            return Err(PilotError::invalid("arc distance is NaN"));
        }
        if radius.is_infinite() {
            return self.travel(distance);
        }
        let angle = (distance / radius.abs()).to_degrees();
        self.arc(radius, angle)
    }

    /// 停止：冻结当前编码器为保持点，清零驱动需求
    ///
    /// # 返回
    ///
    /// 被中断的运动（已经在保持时为 `None`，不会通知观察者）
    pub fn stop(self: &Arc<Self>) -> Option<Move> {
        self.manual.store(false, Ordering::Release);
        let stopped = {
            let mut plan = self.motion.lock();
            let (left, right) = self.balance.encoders();
            let stopped = plan.freeze(&self.geometry, left, right);
            self.balance.set_demand(DriveDemand::IDLE);
            self.settled.notify_all();
            stopped
        };
        if let Some(done) = &stopped {
            info!("Move stopped: {}", done);
            self.notify_completed(done);
        }
        stopped
    }

    /// 直接设置两轮速度（±100 为满速，编码器增大方向为正）
    ///
    /// 正在进行的运动会先被停止。直到下一个运动指令或 `stop()` 之前，
    /// 调节器不做保持修正。
    pub fn wheel_driver(self: &Arc<Self>, left: f64, right: f64) -> Result<(), PilotError> {
        if !(left.is_finite() && right.is_finite()) {
            return Err(PilotError::invalid("wheel speeds must be finite"));
        }
        self.ensure_active()?;
        let interrupted = {
            let mut plan = self.motion.lock();
            let interrupted = if plan.is_moving() {
                let (l, r) = self.balance.encoders();
                plan.freeze(&self.geometry, l, r)
            } else {
                None
            };
            self.manual.store(true, Ordering::Release);
            self.balance.wheel_driver(left, right);
            self.settled.notify_all();
            interrupted
        };
        if let Some(done) = &interrupted {
            self.notify_completed(done);
        }
        debug!("Manual wheel drive ({:.1}, {:.1})", left, right);
        Ok(())
    }

    /// 开始一次运动：中断当前运动（通知完成），计划新目标，写入驱动需求，通知开始
    fn begin<F>(self: &Arc<Self>, plan_move: F) -> Result<(), PilotError>
    where
        F: FnOnce(&mut MotionPlan, &WheelGeometry, f64) -> PlannedMove,
    {
        self.ensure_active()?;
        let speed = self.settings.read().travel_speed;

        let (interrupted, planned, target) = {
            let mut plan = self.motion.lock();
            let interrupted = if plan.is_moving() {
                let (left, right) = self.balance.encoders();
                plan.freeze(&self.geometry, left, right)
            } else {
                None
            };
            self.manual.store(false, Ordering::Release);
            let planned = plan_move(&mut plan, &self.geometry, speed);
            self.balance
                .wheel_driver(planned.left_speed, planned.right_speed);
            (interrupted, planned, plan.target())
        };

        if let Some(done) = &interrupted {
            debug!("Move interrupted by new command: {}", done);
            self.notify_completed(done);
        }
        debug!(
            "Move started: {} (mode {:?}, targets {}, {})",
            planned.started, target.mode, target.left, target.right
        );
        self.notify_started(&planned.started);
        Ok(())
    }

    // ==================== 调节 ====================

    /// 执行一次调节（调节线程每个周期调用一次）
    pub fn regulate_once(self: &Arc<Self>) -> RegulatorAction {
        let action = {
            let mut plan = self.motion.lock();
            let (left, right) = self.balance.encoders();
            let action = regulate(
                &mut plan,
                &self.geometry,
                left,
                right,
                self.hold_max_correction,
            );
            match action {
                RegulatorAction::Hold { left, right } => {
                    if !self.manual.load(Ordering::Acquire) {
                        self.balance.wheel_driver(left, right);
                    }
                },
                RegulatorAction::Completed(_) => {
                    self.balance.set_demand(DriveDemand::IDLE);
                    self.settled.notify_all();
                },
                RegulatorAction::Moving => {},
            }
            action
        };

        if let RegulatorAction::Completed(done) = &action {
            info!("Move completed: {}", done);
            self.notify_completed(done);
        }
        action
    }

    /// 阻塞直到回到保持模式
    ///
    /// # 错误
    ///
    /// 等待期间会话结束时返回 `SessionEnded`
    pub fn wait_until_settled(&self) -> Result<(), PilotError> {
        let mut plan = self.motion.lock();
        while plan.is_moving() {
            let phase = self.balance.phase();
            if phase.is_terminal() {
                return Err(PilotError::SessionEnded(phase));
            }
            self.settled.wait_for(&mut plan, self.regulator_period);
        }
        Ok(())
    }

    /// 唤醒所有等待者（会话结束时）
    pub fn wake_waiters(&self) {
        let _plan = self.motion.lock();
        self.settled.notify_all();
    }

    // ==================== 状态与参数 ====================

    pub fn is_moving(&self) -> bool {
        self.motion.lock().is_moving()
    }

    pub fn mode(&self) -> MotionMode {
        self.motion.lock().mode()
    }

    pub fn target(&self) -> MotionTarget {
        self.motion.lock().target()
    }

    pub fn set_travel_speed(&self, speed: f64) -> Result<(), PilotError> {
        validate_speed(speed)?;
        self.settings.write().travel_speed = speed;
        Ok(())
    }

    pub fn travel_speed(&self) -> f64 {
        self.settings.read().travel_speed
    }

    pub fn max_travel_speed(&self) -> f64 {
        self.settings.read().max_travel_speed
    }

    /// 设置 `arc`/`travel_arc` 允许的最小半径（0 表示不限制）
    pub fn set_min_radius(&self, radius: f64) -> Result<(), PilotError> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(PilotError::invalid(format!(
                "minimum radius must be finite and non-negative, got {}",
                radius
            )));
        }
        self.settings.write().min_radius = radius;
        Ok(())
    }

    pub fn min_radius(&self) -> f64 {
        self.settings.read().min_radius
    }

    pub fn set_move_delay(&self, delay: Duration) {
        self.settings.write().move_delay = delay;
    }

    pub fn move_delay(&self) -> Duration {
        self.settings.read().move_delay
    }

    // ==================== 观察者 ====================

    pub fn add_observer(&self, observer: Arc<dyn MoveObserver>) {
        self.observers.write().add(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn notify_started(self: &Arc<Self>, started: &Move) {
        let observers = self.observers.read().snapshot();
        if observers.is_empty() {
            return;
        }
        let handle = self.handle();
        for observer in observers {
            observer.on_move_started(started, &handle);
        }
    }

    fn notify_completed(self: &Arc<Self>, completed: &Move) {
        let observers = self.observers.read().snapshot();
        if observers.is_empty() {
            return;
        }
        let handle = self.handle();
        for observer in observers {
            observer.on_move_completed(completed, &handle);
        }
    }

    fn ensure_active(&self) -> Result<(), PilotError> {
        let phase = self.balance.phase();
        if phase.is_terminal() {
            Err(PilotError::SessionEnded(phase))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for PilotCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotCore")
            .field("geometry", &self.geometry)
            .field("target", &self.target())
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, MoveEvent};
    use gyrobot_driver::BalanceSnapshot;
    use std::sync::atomic::Ordering;

    fn core_at(left: i64, right: i64) -> Arc<PilotCore> {
        let ctx = Arc::new(BalanceContext::new(
            BalanceSnapshot {
                left_encoder: left,
                right_encoder: right,
                ..Default::default()
            },
            600.0,
        ));
        let geometry = WheelGeometry::new(5.6, 12.0).unwrap();
        PilotCore::new(ctx, geometry, &PilotConfig::default())
    }

    fn move_encoders(core: &PilotCore, left: i64, right: i64) {
        core.balance().publish(BalanceSnapshot {
            left_encoder: left,
            right_encoder: right,
            ..Default::default()
        });
    }

    #[test]
    fn test_invalid_arguments_leave_state_unchanged() {
        let core = core_at(10, 20);
        let before = core.target();

        assert!(matches!(core.travel(f64::NAN), Err(PilotError::InvalidArgument(_))));
        assert!(core.rotate(f64::INFINITY).is_err());
        assert!(core.arc(0.0, 90.0).is_err());
        assert!(core.arc(f64::NAN, 90.0).is_err());
        assert!(core.steer(200.5, 90.0).is_err());
        assert!(core.steer(f64::NAN, 90.0).is_err());
        assert!(core.travel_arc(0.0, 10.0).is_err());
        assert!(core.set_travel_speed(-1.0).is_err());
        assert!(core.set_travel_speed(f64::INFINITY).is_err());
        assert!(core.wheel_driver(f64::NAN, 0.0).is_err());

        assert_eq!(core.target(), before);
        assert_eq!(core.balance().demand(), DriveDemand::IDLE);
        assert_eq!(core.travel_speed(), 50.0);
    }

    #[test]
    fn test_travel_sets_demand_and_notifies() {
        let core = core_at(0, 0);
        let (observer, events) = ChannelObserver::new();
        core.add_observer(Arc::new(observer));

        core.travel(56.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelForward);
        // wheel_driver(-50, -50)
        assert_eq!(core.balance().demand().drive, -300.0);
        assert_eq!(events.try_recv(), Ok(MoveEvent::Started(Move::travel(56.0))));

        move_encoders(&core, -600, -600);
        assert_eq!(core.regulate_once(), RegulatorAction::Moving);

        move_encoders(&core, -1146, -1150);
        assert!(matches!(core.regulate_once(), RegulatorAction::Completed(_)));
        assert!(!core.is_moving());
        assert_eq!(core.balance().demand(), DriveDemand::IDLE);
        match events.try_recv() {
            Ok(MoveEvent::Completed(m)) => assert!((m.distance() - 56.0).abs() < 0.56),
            other => panic!("unexpected event {:?}", other),
        }

        // 完成只通知一次
        core.regulate_once();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_stop_freezes_and_notifies_once() {
        let core = core_at(0, 0);
        let (observer, events) = ChannelObserver::new();
        core.add_observer(Arc::new(observer));

        core.rotate(90.0).unwrap();
        let _ = events.try_recv();
        move_encoders(&core, 100, -100);

        let stopped = core.stop().unwrap();
        assert!(stopped.angle_degrees() > 40.0 && stopped.angle_degrees() < 50.0);
        assert_eq!(
            core.target(),
            MotionTarget {
                left: 100,
                right: -100,
                mode: MotionMode::Hold
            }
        );
        assert!(matches!(events.try_recv(), Ok(MoveEvent::Completed(_))));

        // 已经在保持：不通知
        assert!(core.stop().is_none());
        assert!(events.try_recv().is_err());
        // 调节器也不会再次完成
        assert!(matches!(core.regulate_once(), RegulatorAction::Hold { .. }));
    }

    #[test]
    fn test_new_command_interrupts_current_move() {
        let core = core_at(0, 0);
        let (observer, events) = ChannelObserver::new();
        core.add_observer(Arc::new(observer));

        core.travel(f64::INFINITY).unwrap();
        move_encoders(&core, -300, -300);
        core.rotate(90.0).unwrap();

        let kinds: Vec<_> = events.try_iter().collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[1], MoveEvent::Completed(m) if m.distance() > 14.0));
        // 新运动从中断点出发
        assert_eq!(core.target().left, -300 + 193);
        assert_eq!(core.target().right, -300 - 193);
    }

    #[test]
    fn test_steer_special_cases() {
        let core = core_at(0, 0);
        core.steer(50.0, 0.0).unwrap();
        assert!(!core.is_moving());

        core.steer(0.0, 45.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelForward);
        assert_eq!(core.target().left, i64::MIN);
    }

    #[test]
    fn test_arc_variants() {
        let core = core_at(0, 0);
        core.arc(f64::INFINITY, 90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelForward);

        core.arc(20.0, -90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::ArcBackward);

        // 半径 ±∞ 的 travel_arc 就是直线
        core.stop();
        core.travel_arc(f64::NEG_INFINITY, -10.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelBackward);

        // 右转弧线行驶 31.4：弧长对应 90°
        core.stop();
        let (observer, events) = ChannelObserver::new();
        core.add_observer(Arc::new(observer));
        core.travel_arc(-20.0, 20.0 * std::f64::consts::FRAC_PI_2).unwrap();
        assert_eq!(core.mode(), MotionMode::ArcForward);
        match events.try_recv() {
            Ok(MoveEvent::Started(m)) => assert!((m.angle_degrees() - 90.0).abs() < 1e-9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_huge_radius_arc_travels_arc_length() {
        let core = core_at(0, 0);
        let (observer, events) = ChannelObserver::new();
        core.add_observer(Arc::new(observer));

        // 转向率下溢为 0：方向跟随角度，距离有限
        core.arc(1e18, -90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelBackward);
        match events.try_recv() {
            Ok(MoveEvent::Started(m)) => {
                assert!(m.distance().is_finite());
                assert!((m.distance() + 1e18 * std::f64::consts::FRAC_PI_2).abs() < 1e3);
            },
            other => panic!("unexpected event {:?}", other),
        }

        core.arc(-1e18, 90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelForward);

        core.stop();
        core.arc(1e18, 0.0).unwrap();
        assert!(!core.is_moving());
    }

    #[test]
    fn test_min_radius_rejects_tight_arcs() {
        let core = core_at(0, 0);
        core.set_min_radius(15.0).unwrap();
        let before = core.target();

        assert!(matches!(core.arc(10.0, 90.0), Err(PilotError::InvalidArgument(_))));
        assert!(matches!(core.arc(-14.9, 90.0), Err(PilotError::InvalidArgument(_))));
        assert!(core.travel_arc(5.0, 10.0).is_err());
        assert_eq!(core.target(), before);
        assert!(!core.is_moving());

        core.arc(15.0, 90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::ArcForward);
        core.arc(f64::INFINITY, 90.0).unwrap();
        assert_eq!(core.mode(), MotionMode::TravelForward);
    }

    #[test]
    fn test_manual_drive_suspends_hold() {
        let core = core_at(0, 0);
        core.wheel_driver(-20.0, -20.0).unwrap();
        move_encoders(&core, -50, -50);
        core.regulate_once();
        assert_eq!(core.balance().demand().drive, -120.0);

        core.stop();
        core.regulate_once();
        // 回到保持：修正到新的冻结点
        assert_eq!(core.balance().demand(), DriveDemand::IDLE);
    }

    #[test]
    fn test_commands_rejected_after_session_end() {
        let core = core_at(0, 0);
        core.balance()
            .phase_cell()
            .set(BalancePhase::Fallen, Ordering::Release);

        assert!(matches!(
            core.travel(10.0),
            Err(PilotError::SessionEnded(BalancePhase::Fallen))
        ));
        assert!(core.rotate(10.0).is_err());
        assert!(core.wheel_driver(1.0, 1.0).is_err());
        assert!(!core.is_moving());
    }

    #[test]
    fn test_wait_until_settled_returns_on_fall() {
        let core = core_at(0, 0);
        core.travel(f64::INFINITY).unwrap();
        core.balance()
            .phase_cell()
            .set(BalancePhase::Fallen, Ordering::Release);
        assert!(matches!(
            core.wait_until_settled(),
            Err(PilotError::SessionEnded(BalancePhase::Fallen))
        ));
    }

    #[test]
    fn test_settings() {
        let core = core_at(0, 0);
        core.set_travel_speed(80.0).unwrap();
        assert_eq!(core.travel_speed(), 80.0);
        assert_eq!(core.max_travel_speed(), 200.0);
        core.set_min_radius(15.0).unwrap();
        assert_eq!(core.min_radius(), 15.0);
        assert!(core.set_min_radius(-1.0).is_err());
        core.set_move_delay(Duration::from_millis(5));
        assert_eq!(core.move_delay(), Duration::from_millis(5));
    }
}

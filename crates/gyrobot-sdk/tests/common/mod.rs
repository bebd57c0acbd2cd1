//! 按步交替驱动的仿真台架
//!
//! 每一步：推进模拟电机 → 平衡控制器执行一个周期 → 调节器执行一次。
//! 时间是合成的，结果与线程调度无关。

#![allow(dead_code)]

use gyrobot_client::{PilotConfig, PilotCore, WheelGeometry};
use gyrobot_driver::{BalanceContext, BalanceController, BalancePhase, TickOutcome};
use gyrobot_hal::mock::{SimulatedGyro, SimulatedMotor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct Rig {
    pub left: SimulatedMotor,
    pub right: SimulatedMotor,
    pub gyro: SimulatedGyro,
    pub controller: BalanceController,
    pub core: Arc<PilotCore>,
    pub ctx: Arc<BalanceContext>,
    pub now: Instant,
    pub period: Duration,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(PilotConfig::default())
    }

    pub fn with_config(config: PilotConfig) -> Self {
        let left = SimulatedMotor::new();
        let right = SimulatedMotor::new();
        let gyro = SimulatedGyro::new();
        let controller = BalanceController::with_gyro_offset(
            Box::new(left.clone()),
            Box::new(right.clone()),
            Box::new(gyro.clone()),
            config.balance.clone(),
            0.0,
        )
        .unwrap();

        let now = Instant::now();
        let ctx = Arc::new(BalanceContext::new(
            controller.snapshot(now),
            config.balance.control_speed,
        ));
        ctx.phase_cell().set(BalancePhase::Balancing, Ordering::Release);

        let geometry = WheelGeometry::new(config.balance.wheel_diameter, config.track_width).unwrap();
        let core = PilotCore::new(ctx.clone(), geometry, &config);
        Self {
            left,
            right,
            gyro,
            controller,
            core,
            ctx,
            now,
            period: config.balance.tick_period(),
        }
    }

    /// 推进一步
    pub fn step(&mut self) -> TickOutcome {
        self.left.advance();
        self.right.advance();
        self.now += self.period;
        let outcome = self.controller.step(self.now, &self.ctx);
        if let TickOutcome::Fallen { .. } = outcome {
            self.ctx.phase_cell().terminate(BalancePhase::Fallen);
        }
        self.core.regulate_once();
        outcome
    }

    /// 推进直到条件成立，返回用掉的步数；超过 `max_steps` 返回 `None`
    pub fn run_until(&mut self, max_steps: usize, mut done: impl FnMut(&Rig) -> bool) -> Option<usize> {
        for n in 1..=max_steps {
            self.step();
            if done(self) {
                return Some(n);
            }
        }
        None
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn encoders(&self) -> (i64, i64) {
        (self.left.encoder(), self.right.encoder())
    }
}

/// 在后台按固定周期推进模拟电机（多线程测试用）
pub struct Plant {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Plant {
    pub fn spawn(left: SimulatedMotor, right: SimulatedMotor, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                left.advance();
                right.advance();
                std::thread::sleep(period);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Plant {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

//! 模拟平衡车演示
//!
//! 使用模拟电机和陀螺仪跑一段完整的运动序列：直行、原地旋转、圆弧、后退。
//! 后台线程按控制周期推进模拟电机，`Ctrl-C` 随时停止。
//!
//! ```bash
//! RUST_LOG=gyrobot_client=debug cargo run -p gyrobot-sdk --example simulated_balance -- --distance 30
//! ```

use clap::Parser;
use gyrobot_hal::mock::{SimulatedGyro, SimulatedMotor};
use gyrobot_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "simulated_balance")]
#[command(about = "模拟平衡车运动演示")]
struct Args {
    /// 直行距离（cm）
    #[arg(long, default_value = "30")]
    distance: f64,

    /// 旋转角度（度）
    #[arg(long, default_value = "90")]
    angle: f64,

    /// 圆弧半径（cm）
    #[arg(long, default_value = "25")]
    radius: f64,

    /// 行驶速度
    #[arg(long, default_value = "50")]
    speed: f64,

    /// 陀螺仪噪声幅值（度/秒）
    #[arg(long, default_value = "0.1")]
    noise: f32,
}

/// 打印每次运动的开始和结果
struct Reporter;

impl MoveObserver for Reporter {
    fn on_move_started(&self, started: &Move, _pilot: &PilotHandle) {
        println!("   ▶ {}", started);
    }

    fn on_move_completed(&self, completed: &Move, pilot: &PilotHandle) {
        let snapshot = pilot.snapshot();
        println!(
            "   ■ {} (encoders {}, {})",
            completed, snapshot.left_encoder, snapshot.right_encoder
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    gyrobot_sdk::init_logging();
    let args = Args::parse();

    println!("🤖 Gyrobot SDK - 模拟平衡车演示");
    println!("=========================\n");

    let left = SimulatedMotor::new();
    let right = SimulatedMotor::new();
    let gyro = SimulatedGyro::with_bias(0.3);
    gyro.set_noise(args.noise);

    // 后台推进模拟电机
    let running = Arc::new(AtomicBool::new(true));
    let plant = {
        let (left, right, running) = (left.clone(), right.clone(), running.clone());
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                left.advance();
                right.advance();
                thread::sleep(Duration::from_millis(7));
            }
        })
    };

    println!("📡 校准陀螺仪并启动平衡线程...");
    let mut pilot = PilotBuilder::new()
        .left_motor(left.clone())
        .right_motor(right.clone())
        .gyroscope(gyro)
        .travel_speed(args.speed)
        .build()?;
    pilot.add_observer(Arc::new(Reporter));
    println!("   ✅ 平衡中\n");

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let handle = pilot.handle();
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            println!("\n⚠️  收到 Ctrl-C，停止运动");
            interrupted.store(true, Ordering::Relaxed);
            handle.stop();
        })?;
    }

    let moves: [&dyn Fn() -> Result<(), PilotError>; 4] = [
        &|| pilot.travel(args.distance, false),
        &|| pilot.rotate(args.angle, false),
        &|| pilot.arc(args.radius, 180.0, false),
        &|| pilot.travel(-args.distance / 2.0, false),
    ];
    for run in moves {
        if interrupted.load(Ordering::Relaxed) {
            break;
        }
        if let Err(e) = run() {
            eprintln!("❌ 运动中断: {}", e);
            break;
        }
    }

    let snapshot = pilot.snapshot();
    println!(
        "\n📊 周期 {}，间隔 {:.2} ms，陀螺零偏 {:.3}",
        snapshot.tick_count,
        snapshot.tick_interval * 1000.0,
        snapshot.gyro_offset
    );

    pilot.shutdown();
    running.store(false, Ordering::Relaxed);
    let _ = plant.join();
    println!("👋 已关闭，电机滑行");
    Ok(())
}

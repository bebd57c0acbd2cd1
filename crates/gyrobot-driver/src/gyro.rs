//! 陀螺仪零偏跟踪
//!
//! 启动时静态校准得到初始零偏，之后每个控制周期用固定权重的 EMA 缓慢跟踪漂移。

use crate::config::CalibrationConfig;
use crate::error::DriverError;
use gyrobot_hal::Gyroscope;
use spin_sleep::SpinSleeper;
use tracing::{debug, info, warn};

/// 陀螺仪零偏跟踪器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroOffsetTracker {
    offset: f64,
    weight: f64,
}

impl GyroOffsetTracker {
    /// 使用已知零偏创建（跳过校准）
    pub fn new(initial_offset: f64, weight: f64) -> Self {
        Self {
            offset: initial_offset,
            weight,
        }
    }

    /// 静态校准
    ///
    /// 先让传感器重建自身零偏，然后成批采样；批内极差超过 `max_spread` 说明车体
    /// 在动，整批丢弃重采。车体必须保持静止，函数会阻塞直到得到稳定批次。
    ///
    /// # 错误
    ///
    /// - `DriverError::Hal`: `recalibrate_offset()` 失败
    /// - `DriverError::CalibrationUnstable`: 尝试次数耗尽
    pub fn calibrate<G: Gyroscope + ?Sized>(
        gyro: &mut G,
        config: &CalibrationConfig,
        weight: f64,
    ) -> Result<Self, DriverError> {
        gyro.recalibrate_offset()?;

        let sleeper = SpinSleeper::default();
        let interval = config.sample_interval();
        let mut samples = Vec::with_capacity(config.samples);
        let mut last_spread = f64::INFINITY;

        for attempt in 1..=config.max_attempts {
            samples.clear();
            let mut read_failed = false;
            for _ in 0..config.samples {
                match gyro.angular_velocity_deg_per_sec() {
                    Ok(v) => samples.push(f64::from(v)),
                    Err(e) => {
                        warn!("Gyro read failed during calibration (attempt {}): {}", attempt, e);
                        read_failed = true;
                        break;
                    },
                }
                sleeper.sleep(interval);
            }
            if read_failed || samples.is_empty() {
                continue;
            }

            let (min, max) = samples
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            last_spread = max - min;

            if last_spread <= config.max_spread {
                let offset = samples.iter().sum::<f64>() / samples.len() as f64;
                info!(
                    "Gyro calibrated: offset={:.4} deg/s (spread {:.3}, attempt {})",
                    offset, last_spread, attempt
                );
                return Ok(Self::new(offset, weight));
            }

            debug!(
                "Gyro calibration batch rejected: spread {:.3} > {:.3} (attempt {})",
                last_spread, config.max_spread, attempt
            );
        }

        Err(DriverError::CalibrationUnstable {
            attempts: config.max_attempts,
            spread: last_spread,
        })
    }

    /// 用本周期的原始读数更新零偏，返回去零偏后的角速度
    pub fn update(&mut self, raw: f64) -> f64 {
        self.offset = self.weight * raw + (1.0 - self.weight) * self.offset;
        raw - self.offset
    }

    /// 当前零偏（度/秒）
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyrobot_hal::mock::SimulatedGyro;

    fn fast_calibration() -> CalibrationConfig {
        CalibrationConfig {
            samples: 20,
            sample_interval_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_calibrate_averages_stationary_batch() {
        let probe = SimulatedGyro::with_bias(1.5);
        probe.set_noise(0.2);
        let mut gyro = probe.clone();

        let tracker = GyroOffsetTracker::calibrate(&mut gyro, &fast_calibration(), 0.0005).unwrap();
        assert!((tracker.offset() - 1.5).abs() <= 0.2);
        assert_eq!(probe.recalibrations(), 1);
    }

    #[test]
    fn test_calibrate_rejects_moving_vehicle() {
        let probe = SimulatedGyro::new();
        probe.set_noise(5.0);
        let mut gyro = probe.clone();

        let config = CalibrationConfig {
            max_attempts: 3,
            ..fast_calibration()
        };
        let err = GyroOffsetTracker::calibrate(&mut gyro, &config, 0.0005).unwrap_err();
        match err {
            DriverError::CalibrationUnstable { attempts, spread } => {
                assert_eq!(attempts, 3);
                assert!(spread > 1.0);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_calibrate_retries_after_read_failure() {
        let probe = SimulatedGyro::with_bias(-0.75);
        probe.fail_next_reads(1);
        let mut gyro = probe.clone();

        let tracker = GyroOffsetTracker::calibrate(&mut gyro, &fast_calibration(), 0.0005).unwrap();
        assert!((tracker.offset() + 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_ema_update() {
        let mut tracker = GyroOffsetTracker::new(0.0, 0.5);
        let filtered = tracker.update(2.0);
        assert!((tracker.offset() - 1.0).abs() < 1e-12);
        assert!((filtered - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_tracks_slow_drift() {
        let mut tracker = GyroOffsetTracker::new(0.0, 0.0005);
        for _ in 0..20_000 {
            tracker.update(0.3);
        }
        // 1 - (1 - 0.0005)^20000 ≈ 0.99995
        assert!((tracker.offset() - 0.3).abs() < 1e-3);
    }
}

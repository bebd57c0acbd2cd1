//! # 平衡控制配置
//!
//! 增益、时序和陀螺仪校准参数。所有字段都有默认值，TOML 文件中只需要写出
//! 想覆盖的部分：
//!
//! ```toml
//! wheel_diameter = 5.6
//! tick_period_ms = 7
//!
//! [gains]
//! gyro_angle = 7.5
//! steer = 0.25
//!
//! [calibration]
//! samples = 100
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 增益表按这个轮径整定，其他轮径按比例缩放陀螺项
pub const REFERENCE_WHEEL_DIAMETER: f64 = 5.6;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// 平衡控制增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceGains {
    /// 倾角增益
    pub gyro_angle: f64,
    /// 角速度增益
    pub gyro_speed: f64,
    /// 轮子位置增益
    pub position: f64,
    /// 轮子速度增益
    pub speed: f64,
    /// 驱动前馈增益（负值：前进需求让车体先后仰）
    pub drive: f64,
    /// 差速转向增益
    pub steer: f64,
}

impl Default for BalanceGains {
    fn default() -> Self {
        Self {
            gyro_angle: 7.5,
            gyro_speed: 1.15,
            position: 0.07,
            speed: 0.1,
            drive: -0.02,
            steer: 0.25,
        }
    }
}

/// 陀螺仪静态校准参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// 每批采样数
    pub samples: usize,
    /// 采样间隔（ms）
    pub sample_interval_ms: u64,
    /// 批内极差上限（度/秒），超过则认为车体在动，重新采样
    pub max_spread: f64,
    /// 最多尝试的批次数
    pub max_attempts: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            sample_interval_ms: 5,
            max_spread: 1.0,
            max_attempts: 10,
        }
    }
}

impl CalibrationConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// 平衡控制配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// 轮径（与距离单位一致，通常为 cm）
    pub wheel_diameter: f64,
    pub gains: BalanceGains,
    /// 陀螺零偏 EMA 权重
    pub gyro_ema_weight: f64,
    /// 控制周期（ms）
    pub tick_period_ms: u64,
    /// 第一个周期使用的间隔估计（秒）
    pub seed_interval_s: f64,
    /// 功率持续饱和超过此时长判定为跌倒（ms）
    pub saturation_window_ms: u64,
    /// `wheel_driver` 的速度换算系数：输入 ±100 对应的编码器速率（度/秒）
    pub control_speed: f64,
    pub calibration: CalibrationConfig,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            wheel_diameter: REFERENCE_WHEEL_DIAMETER,
            gains: BalanceGains::default(),
            gyro_ema_weight: 0.0005,
            tick_period_ms: 7,
            seed_interval_s: 0.0055,
            saturation_window_ms: 500,
            control_speed: 600.0,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl BalanceConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BalanceConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// 保存为 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// 检查数值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wheel_diameter.is_finite() && self.wheel_diameter > 0.0) {
            return Err(ConfigError::invalid(
                "wheel_diameter",
                format!("must be positive and finite, got {}", self.wheel_diameter),
            ));
        }
        let g = &self.gains;
        let gains = [
            ("gains.gyro_angle", g.gyro_angle),
            ("gains.gyro_speed", g.gyro_speed),
            ("gains.position", g.position),
            ("gains.speed", g.speed),
            ("gains.drive", g.drive),
            ("gains.steer", g.steer),
        ];
        for (field, value) in gains {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "must be finite"));
            }
        }
        if !(self.gyro_ema_weight > 0.0 && self.gyro_ema_weight < 1.0) {
            return Err(ConfigError::invalid(
                "gyro_ema_weight",
                format!("must be in (0, 1), got {}", self.gyro_ema_weight),
            ));
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::invalid("tick_period_ms", "must be > 0"));
        }
        if !(self.seed_interval_s.is_finite() && self.seed_interval_s > 0.0) {
            return Err(ConfigError::invalid("seed_interval_s", "must be positive"));
        }
        if self.saturation_window_ms == 0 {
            return Err(ConfigError::invalid("saturation_window_ms", "must be > 0"));
        }
        if !(self.control_speed.is_finite() && self.control_speed > 0.0) {
            return Err(ConfigError::invalid("control_speed", "must be positive"));
        }
        let c = &self.calibration;
        if c.samples == 0 {
            return Err(ConfigError::invalid("calibration.samples", "must be > 0"));
        }
        if c.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "calibration.max_attempts",
                "must be > 0",
            ));
        }
        if !(c.max_spread.is_finite() && c.max_spread >= 0.0) {
            return Err(ConfigError::invalid(
                "calibration.max_spread",
                "must be non-negative",
            ));
        }
        Ok(())
    }

    /// 陀螺项的轮径缩放系数
    pub fn wheel_ratio(&self) -> f64 {
        self.wheel_diameter / REFERENCE_WHEEL_DIAMETER
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn saturation_window(&self) -> Duration {
        Duration::from_millis(self.saturation_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BalanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_period(), Duration::from_millis(7));
        assert_eq!(config.saturation_window(), Duration::from_millis(500));
        assert!((config.wheel_ratio() - 1.0).abs() < 1e-12);
        assert_eq!(config.gains.gyro_angle, 7.5);
        assert_eq!(config.calibration.samples, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BalanceConfig::from_toml_str(
            r#"
wheel_diameter = 8.16

[gains]
steer = 0.5
"#,
        )
        .unwrap();

        assert_eq!(config.wheel_diameter, 8.16);
        assert_eq!(config.gains.steer, 0.5);
        assert_eq!(config.gains.gyro_speed, 1.15);
        assert_eq!(config.tick_period_ms, 7);
        assert!((config.wheel_ratio() - 8.16 / 5.6).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = BalanceConfig::from_toml_str("wheel_diameter = 0.0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "wheel_diameter",
                ..
            }
        ));

        let err = BalanceConfig::from_toml_str("gyro_ema_weight = 1.5").unwrap_err();
        assert!(format!("{}", err).contains("gyro_ema_weight"));

        let err = BalanceConfig::from_toml_str("[calibration]\nsamples = 0").unwrap_err();
        assert!(format!("{}", err).contains("calibration.samples"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = BalanceConfig::from_toml_str("wheel_diameter = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.toml");

        let mut config = BalanceConfig::default();
        config.gains.position = 0.09;
        config.saturation_window_ms = 750;
        config.save_to_file(&path).unwrap();

        let loaded = BalanceConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = BalanceConfig::load_from_file("/nonexistent/gyrobot/balance.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

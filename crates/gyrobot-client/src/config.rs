//! # Pilot 配置
//!
//! 几何、速度和调节线程参数，平衡控制参数嵌套在 `[balance]` 表中：
//!
//! ```toml
//! track_width = 12.0
//! travel_speed = 50.0
//!
//! [balance]
//! wheel_diameter = 5.6
//! ```

use crate::error::PilotError;
use gyrobot_driver::{BalanceConfig, ConfigError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Pilot 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// 轮距（两轮接地点间距，与轮径单位一致）
    pub track_width: f64,
    /// 行驶速度（±100 为满速）
    pub travel_speed: f64,
    /// 报告给调用方的最大行驶速度
    pub max_travel_speed: f64,
    /// 最小转弯半径，`arc` 拒绝更小的有限半径（0 为不限制）
    pub min_radius: f64,
    /// 保持模式每个轮子的最大修正速度
    pub hold_max_correction: f64,
    /// 调节线程周期（ms）
    pub regulator_period_ms: u64,
    /// 每个运动指令之后的静置时间（ms）
    pub move_delay_ms: u64,
    pub balance: BalanceConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            track_width: 12.0,
            travel_speed: 50.0,
            max_travel_speed: 200.0,
            min_radius: 0.0,
            hold_max_correction: 5.0,
            regulator_period_ms: 7,
            move_delay_ms: 0,
            balance: BalanceConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, PilotError> {
        let config: PilotConfig = toml::from_str(s).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PilotError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PilotError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::from)?;
        fs::write(path, contents).map_err(ConfigError::from)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PilotError> {
        self.balance.validate()?;
        if !(self.track_width.is_finite() && self.track_width > 0.0) {
            return Err(PilotError::invalid(format!(
                "track_width must be positive and finite, got {}",
                self.track_width
            )));
        }
        validate_speed(self.travel_speed)?;
        validate_speed(self.max_travel_speed)?;
        if !(self.min_radius.is_finite() && self.min_radius >= 0.0) {
            return Err(PilotError::invalid("min_radius must be non-negative"));
        }
        if !(self.hold_max_correction.is_finite() && self.hold_max_correction > 0.0) {
            return Err(PilotError::invalid("hold_max_correction must be positive"));
        }
        if self.regulator_period_ms == 0 {
            return Err(PilotError::invalid("regulator_period_ms must be > 0"));
        }
        Ok(())
    }

    pub fn regulator_period(&self) -> Duration {
        Duration::from_millis(self.regulator_period_ms)
    }

    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_delay_ms)
    }
}

/// 速度必须是有限的非负数
pub(crate) fn validate_speed(speed: f64) -> Result<(), PilotError> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(())
    } else {
        Err(PilotError::invalid(format!(
            "speed must be finite and non-negative, got {}",
            speed
        )))
    }
}

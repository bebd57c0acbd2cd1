//! 轮子几何换算
//!
//! 距离单位与构造时给出的轮径、轮距一致（通常为 cm）；角度单位为度；
//! 轮子转角用编码器度数表示。

use crate::error::PilotError;
use std::f64::consts::PI;

/// 转向率上限：±200 表示两轮反向（原地旋转）
pub const MAX_TURN_RATE: f64 = 200.0;

/// 转向率对应的内侧轮速度比例：`1 − |turnRate| / 100`
///
/// 0 为直行（比例 1），±100 内侧轮停止，±200 内侧轮反向全速。
pub fn steer_ratio(turn_rate: f64) -> f64 {
    1.0 - turn_rate.abs() / 100.0
}

/// 弧线运动的两轮转角（编码器度数，带符号：正值为向前行驶的度数）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcWheels {
    pub outside: i64,
    pub inside: i64,
    pub steer_ratio: f64,
}

/// 两轮车的几何参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    wheel_diameter: f64,
    track_width: f64,
}

impl WheelGeometry {
    /// # 错误
    ///
    /// 轮径或轮距不是有限正数时返回 `InvalidArgument`
    pub fn new(wheel_diameter: f64, track_width: f64) -> Result<Self, PilotError> {
        if !(wheel_diameter.is_finite() && wheel_diameter > 0.0) {
            return Err(PilotError::invalid(format!(
                "wheel diameter must be positive and finite, got {}",
                wheel_diameter
            )));
        }
        if !(track_width.is_finite() && track_width > 0.0) {
            return Err(PilotError::invalid(format!(
                "track width must be positive and finite, got {}",
                track_width
            )));
        }
        Ok(Self {
            wheel_diameter,
            track_width,
        })
    }

    pub fn wheel_diameter(&self) -> f64 {
        self.wheel_diameter
    }

    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    pub fn wheel_circumference(&self) -> f64 {
        PI * self.wheel_diameter
    }

    /// 行驶 `distance` 每个轮子需要转过的度数
    pub fn travel_degrees(&self, distance: f64) -> i64 {
        (distance / self.wheel_circumference() * 360.0).round() as i64
    }

    /// 原地旋转 `degrees` 每个轮子需要转过的度数
    pub fn rotation_degrees(&self, degrees: f64) -> i64 {
        let arc_length = degrees / 360.0 * self.track_width * PI;
        self.travel_degrees(arc_length)
    }

    /// 轮子转过 `wheel_degrees` 对应的行驶距离
    pub fn distance_for_degrees(&self, wheel_degrees: f64) -> f64 {
        self.wheel_circumference() * wheel_degrees / 360.0
    }

    /// 两轮以相反方向各走 `distance` 时车头转过的角度
    pub fn heading_for_distance(&self, distance: f64) -> f64 {
        360.0 * distance / (self.track_width * PI)
    }

    /// 转弯半径换算为转向率
    ///
    /// 正半径的圆心在左侧。半径小于半个轮距时内侧轮反转，转向率超过 100。
    pub fn turn_rate_for_radius(&self, radius: f64) -> f64 {
        if radius.is_infinite() {
            return 0.0;
        }
        let r = radius.abs();
        let ratio = (2.0 * r - self.track_width) / (2.0 * r + self.track_width);
        radius.signum() * 100.0 * (1.0 - ratio)
    }

    /// 转向率换算为转弯半径（转向率 0 为无穷大）
    pub fn radius_for_turn_rate(&self, turn_rate: f64) -> f64 {
        if turn_rate == 0.0 {
            return f64::INFINITY;
        }
        let s = steer_ratio(turn_rate);
        turn_rate.signum() * self.track_width * (1.0 + s) / (2.0 * (1.0 - s))
    }

    /// 以 `turn_rate` 转过 `angle` 度时两轮的转角
    ///
    /// 转向率必须非零（直行没有有限的弧线转角）。
    pub fn arc_wheels(&self, turn_rate: f64, angle: f64) -> ArcWheels {
        let s = steer_ratio(turn_rate);
        let outside =
            (angle * 2.0 * self.track_width / (self.wheel_diameter * (1.0 - s))).round();
        ArcWheels {
            outside: outside as i64,
            inside: (outside * s).round() as i64,
            steer_ratio: s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry() -> WheelGeometry {
        WheelGeometry::new(5.6, 12.0).unwrap()
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(WheelGeometry::new(0.0, 12.0).is_err());
        assert!(WheelGeometry::new(5.6, -1.0).is_err());
        assert!(WheelGeometry::new(f64::NAN, 12.0).is_err());
        assert!(WheelGeometry::new(5.6, f64::INFINITY).is_err());
    }

    #[test]
    fn test_travel_degrees() {
        let g = geometry();
        // 56 / (π · 5.6) · 360 = 3600 / π
        assert_eq!(g.travel_degrees(56.0), 1146);
        assert_eq!(g.travel_degrees(-56.0), -1146);
        assert_eq!(g.travel_degrees(0.0), 0);
    }

    #[test]
    fn test_rotation_degrees() {
        let g = geometry();
        // 90 · 12 / 5.6
        assert_eq!(g.rotation_degrees(90.0), 193);
        assert_eq!(g.rotation_degrees(-90.0), -193);
    }

    #[test]
    fn test_turn_rate_is_symmetric() {
        let g = geometry();
        let left = g.turn_rate_for_radius(20.0);
        let right = g.turn_rate_for_radius(-20.0);
        assert!((left - 46.153846).abs() < 1e-4, "{}", left);
        assert_eq!(left, -right);
        assert_eq!(g.turn_rate_for_radius(f64::INFINITY), 0.0);
        assert_eq!(g.turn_rate_for_radius(f64::NEG_INFINITY), 0.0);
        // 半径为半个轮距时内侧轮停止
        assert!((g.turn_rate_for_radius(6.0) - 100.0).abs() < 1e-9);
        // 半径趋近 0 时两轮反向
        assert!((g.turn_rate_for_radius(1e-9) - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_radius_turn_rate_inverse() {
        let g = geometry();
        for radius in [3.0, 6.0, 20.0, -20.0, 150.0] {
            let rate = g.turn_rate_for_radius(radius);
            assert!((g.radius_for_turn_rate(rate) - radius).abs() < 1e-9);
        }
        assert!(g.radius_for_turn_rate(0.0).is_infinite());
        assert_eq!(g.radius_for_turn_rate(200.0), 0.0);
    }

    #[test]
    fn test_arc_wheels() {
        let g = geometry();
        let rate = g.turn_rate_for_radius(20.0);
        let arc = g.arc_wheels(rate, 90.0);
        // 外侧轮行驶 90° · (20 + 6) 的弧长
        let expected_outside = g.travel_degrees(PI / 2.0 * 26.0);
        assert!((arc.outside - expected_outside).abs() <= 1);
        assert!((arc.inside as f64 - arc.outside as f64 * 14.0 / 26.0).abs() <= 1.0);

        // 原地旋转与 rotation_degrees 一致
        let spin = g.arc_wheels(200.0, 90.0);
        assert_eq!(spin.outside, g.rotation_degrees(90.0));
        assert_eq!(spin.inside, -spin.outside);

        let backward = g.arc_wheels(rate, -90.0);
        assert_eq!(backward.outside, -arc.outside);
    }

    proptest! {
        #[test]
        fn prop_travel_round_trip(distance in -1000.0f64..1000.0) {
            let g = geometry();
            let degrees = g.travel_degrees(distance);
            let back = g.distance_for_degrees(degrees as f64);
            // 误差不超过半个编码器度
            prop_assert!((back - distance).abs() <= g.distance_for_degrees(0.5) + 1e-9);
        }

        #[test]
        fn prop_rotation_round_trip(degrees in -720.0f64..720.0) {
            let g = geometry();
            let w = g.rotation_degrees(degrees);
            let back = g.heading_for_distance(g.distance_for_degrees(w as f64));
            let tolerance = g.heading_for_distance(g.distance_for_degrees(0.5)) + 1e-9;
            prop_assert!((back - degrees).abs() <= tolerance);
        }
    }
}

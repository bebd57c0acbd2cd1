//! 运动状态机
//!
//! [`MotionPlan`] 是运动单元格的内容：目标编码器、模式、起点和弧线参数。
//! 它只做纯计算，加锁、写驱动需求和通知观察者由 [`PilotCore`](crate::PilotCore) 负责。
//!
//! 编码器约定见 `gyrobot-hal`：向前行驶时两轮编码器减小。
//! 轮速（传给 `wheel_driver`）以编码器增大的方向为正，所以向前行驶的轮速为负。

use crate::geometry::{WheelGeometry, steer_ratio};
use crate::movement::{Move, MoveKind};

/// 运动模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionMode {
    /// 保持在目标编码器位置
    #[default]
    Hold,
    TravelForward,
    TravelBackward,
    RotateLeft,
    RotateRight,
    ArcForward,
    ArcBackward,
}

impl MotionMode {
    pub fn is_moving(self) -> bool {
        self != Self::Hold
    }

    pub fn kind(self) -> Option<MoveKind> {
        match self {
            Self::Hold => None,
            Self::TravelForward | Self::TravelBackward => Some(MoveKind::Travel),
            Self::RotateLeft | Self::RotateRight => Some(MoveKind::Rotate),
            Self::ArcForward | Self::ArcBackward => Some(MoveKind::Arc),
        }
    }
}

/// 目标编码器与模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTarget {
    pub left: i64,
    pub right: i64,
    pub mode: MotionMode,
}

/// 刚开始的运动：计划值和两轮速度（±100 为满速，编码器增大方向为正）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedMove {
    pub started: Move,
    pub left_speed: f64,
    pub right_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ArcPlan {
    planned_angle: f64,
    direction_sign: f64,
    radius: f64,
}

/// 单个轮子是否到达目标
///
/// 方向取 `sign(target − start)`，越过目标即到达；没有计划行程的轮子立即到达。
fn wheel_reached(start: i64, target: i64, current: i64) -> bool {
    match target.cmp(&start) {
        std::cmp::Ordering::Less => current <= target,
        std::cmp::Ordering::Greater => current >= target,
        std::cmp::Ordering::Equal => true,
    }
}

/// 运动单元格内容
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlan {
    target: MotionTarget,
    start: (i64, i64),
    arc: Option<ArcPlan>,
}

impl MotionPlan {
    /// 在给定编码器位置保持
    pub fn holding(left: i64, right: i64) -> Self {
        Self {
            target: MotionTarget {
                left,
                right,
                mode: MotionMode::Hold,
            },
            start: (left, right),
            arc: None,
        }
    }

    pub fn target(&self) -> MotionTarget {
        self.target
    }

    pub fn mode(&self) -> MotionMode {
        self.target.mode
    }

    pub fn is_moving(&self) -> bool {
        self.target.mode.is_moving()
    }

    /// 当前运动的起点编码器
    pub fn start(&self) -> (i64, i64) {
        self.start
    }

    /// 从当前保持点出发开始一次运动
    fn begin(&mut self, left: i64, right: i64, mode: MotionMode, arc: Option<ArcPlan>) {
        self.start = (self.target.left, self.target.right);
        self.target = MotionTarget { left, right, mode };
        self.arc = arc;
    }

    /// 直线行驶，`±∞` 表示不设终点
    pub fn plan_travel(
        &mut self,
        geometry: &WheelGeometry,
        distance: f64,
        speed: f64,
    ) -> PlannedMove {
        let forward = distance > 0.0;
        let mode = if forward {
            MotionMode::TravelForward
        } else {
            MotionMode::TravelBackward
        };
        let (left, right) = if distance.is_infinite() {
            let t = if forward { i64::MIN } else { i64::MAX };
            (t, t)
        } else {
            let delta = geometry.travel_degrees(distance);
            (
                self.target.left.saturating_sub(delta),
                self.target.right.saturating_sub(delta),
            )
        };
        self.begin(left, right, mode, None);

        let wheel = if forward { -speed } else { speed };
        PlannedMove {
            started: Move::travel(distance),
            left_speed: wheel,
            right_speed: wheel,
        }
    }

    /// 原地旋转，正值向左
    pub fn plan_rotate(
        &mut self,
        geometry: &WheelGeometry,
        degrees: f64,
        speed: f64,
    ) -> PlannedMove {
        let w = geometry.rotation_degrees(degrees);
        let mode = if degrees > 0.0 {
            MotionMode::RotateLeft
        } else {
            MotionMode::RotateRight
        };
        let left = self.target.left.saturating_add(w);
        let right = self.target.right.saturating_sub(w);
        self.begin(left, right, mode, None);

        let wheel = if degrees > 0.0 { speed } else { -speed };
        PlannedMove {
            started: Move::rotate(degrees),
            left_speed: wheel,
            right_speed: -wheel,
        }
    }

    /// 弧线运动
    ///
    /// `turn_rate` 非零，正值左轮在内侧；`angle` 正值向前，`±∞` 表示不设终点。
    pub fn plan_arc(
        &mut self,
        geometry: &WheelGeometry,
        turn_rate: f64,
        angle: f64,
        speed: f64,
    ) -> PlannedMove {
        let forward = angle > 0.0;
        let left_inside = turn_rate > 0.0;
        let mode = if forward {
            MotionMode::ArcForward
        } else {
            MotionMode::ArcBackward
        };

        let (left, right) = if angle.is_infinite() {
            let t = if forward { i64::MIN } else { i64::MAX };
            (t, t)
        } else {
            let wheels = geometry.arc_wheels(turn_rate, angle);
            let (dl, dr) = if left_inside {
                (wheels.inside, wheels.outside)
            } else {
                (wheels.outside, wheels.inside)
            };
            (
                self.target.left.saturating_sub(dl),
                self.target.right.saturating_sub(dr),
            )
        };

        let radius = geometry.radius_for_turn_rate(turn_rate);
        let arc = ArcPlan {
            planned_angle: angle,
            direction_sign: turn_rate.signum(),
            radius,
        };
        self.begin(left, right, mode, Some(arc));

        let s = steer_ratio(turn_rate);
        let outside = if forward { -speed } else { speed };
        let inside = outside * s;
        let (left_speed, right_speed) = if left_inside {
            (inside, outside)
        } else {
            (outside, inside)
        };
        let distance = if radius == 0.0 {
            0.0
        } else {
            angle.to_radians() * radius.abs()
        };
        PlannedMove {
            started: Move::arc(distance, angle, Some(radius)),
            left_speed,
            right_speed,
        }
    }

    /// 两轮是否都已到达目标
    pub fn reached(&self, left: i64, right: i64) -> bool {
        wheel_reached(self.start.0, self.target.left, left)
            && wheel_reached(self.start.1, self.target.right, right)
    }

    /// 到达目标时切换到保持（目标保留为保持点），返回完成的运动
    ///
    /// 每个目标只会完成一次：完成后模式为 `Hold`，再调用返回 `None`。
    pub fn complete(&mut self, geometry: &WheelGeometry, left: i64, right: i64) -> Option<Move> {
        if !self.is_moving() || !self.reached(left, right) {
            return None;
        }
        let done = self.account(geometry, left, right);
        self.target.mode = MotionMode::Hold;
        self.arc = None;
        Some(done)
    }

    /// 停止：把当前编码器冻结为保持点，返回被中断的运动（保持中则为 `None`）
    pub fn freeze(&mut self, geometry: &WheelGeometry, left: i64, right: i64) -> Option<Move> {
        let interrupted = self
            .is_moving()
            .then(|| self.account(geometry, left, right));
        *self = Self::holding(left, right);
        interrupted
    }

    /// 保持模式的两轮修正速度：`clamp((target − current) / 2, ±max)`
    pub fn hold_correction(&self, left: i64, right: i64, max: f64) -> (f64, f64) {
        let correction =
            |target: i64, current: i64| ((target as f64 - current as f64) / 2.0).clamp(-max, max);
        (
            correction(self.target.left, left),
            correction(self.target.right, right),
        )
    }

    /// 按当前编码器统计从起点开始的实际运动
    pub fn account(&self, geometry: &WheelGeometry, left: i64, right: i64) -> Move {
        let dl = left as f64 - self.start.0 as f64;
        let dr = right as f64 - self.start.1 as f64;
        // 向前为正的平均轮子转角
        let travelled = -(dl + dr) / 2.0;
        let heading = |differential: f64| {
            geometry.heading_for_distance(geometry.distance_for_degrees(differential))
        };

        match self.target.mode.kind() {
            None | Some(MoveKind::Travel) => Move::travel(geometry.distance_for_degrees(travelled)),
            Some(MoveKind::Rotate) => Move::rotate(heading((dl - dr) / 2.0)),
            Some(MoveKind::Arc) => {
                let distance = geometry.distance_for_degrees(travelled);
                let planned = ((self.start.0 as f64 - self.target.left as f64)
                    + (self.start.1 as f64 - self.target.right as f64))
                    / 2.0;
                let angle = match self.arc {
                    Some(arc) if arc.planned_angle.is_finite() && planned != 0.0 => {
                        travelled / planned * arc.planned_angle * arc.direction_sign
                    },
                    // 原地旋转或不设终点：从两轮差动推算
                    _ => heading((dl - dr) / 2.0),
                };
                Move::arc(distance, angle, self.arc.map(|a| a.radius))
            },
        }
    }
}

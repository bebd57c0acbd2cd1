//! 运动记录

/// 运动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Travel,
    Rotate,
    Arc,
}

/// 一次运动（开始时为计划值，完成时为实际完成量）
///
/// - `distance`: 行驶距离，向前为正
/// - `angle_degrees`: 车头转过的角度，向左（逆时针）为正
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    kind: MoveKind,
    distance: f64,
    angle_degrees: f64,
    arc_radius: Option<f64>,
}

impl Move {
    pub fn travel(distance: f64) -> Self {
        Self {
            kind: MoveKind::Travel,
            distance,
            angle_degrees: 0.0,
            arc_radius: None,
        }
    }

    pub fn rotate(angle_degrees: f64) -> Self {
        Self {
            kind: MoveKind::Rotate,
            distance: 0.0,
            angle_degrees,
            arc_radius: None,
        }
    }

    pub fn arc(distance: f64, angle_degrees: f64, radius: Option<f64>) -> Self {
        Self {
            kind: MoveKind::Arc,
            distance,
            angle_degrees,
            arc_radius: radius,
        }
    }

    pub fn kind(&self) -> MoveKind {
        self.kind
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    pub fn was_arc(&self) -> bool {
        self.kind == MoveKind::Arc
    }

    /// 弧线运动开始时请求的半径（正值圆心在左侧）
    pub fn arc_radius(&self) -> Option<f64> {
        self.arc_radius
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MoveKind::Travel => write!(f, "travel {:.2}", self.distance),
            MoveKind::Rotate => write!(f, "rotate {:.2}°", self.angle_degrees),
            MoveKind::Arc => write!(
                f,
                "arc {:.2}° over {:.2}",
                self.angle_degrees, self.distance
            ),
        }
    }
}

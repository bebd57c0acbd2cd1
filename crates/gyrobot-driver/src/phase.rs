//! 平衡会话阶段
//!
//! `Calibrating → Balancing → Fallen | Stopped`，后两者为终态。

use std::sync::atomic::{AtomicU8, Ordering};

/// 平衡会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BalancePhase {
    /// 陀螺仪校准中，平衡线程尚未运行
    #[default]
    Calibrating = 0,

    /// 平衡线程正在按周期控制电机
    Balancing = 1,

    /// 功率持续饱和，判定跌倒（终态）
    Fallen = 2,

    /// 显式关闭（终态）
    Stopped = 3,
}

impl BalancePhase {
    /// 从 u8 转换
    ///
    /// 无效值按 `Stopped` 处理。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Calibrating,
            1 => Self::Balancing,
            2 => Self::Fallen,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fallen | Self::Stopped)
    }

    pub fn is_balancing(self) -> bool {
        self == Self::Balancing
    }
}

/// 会话阶段（原子版本，用于线程间共享）
///
/// # 使用场景
///
/// - 平衡线程在启动、跌倒、退出时写入
/// - 调节线程和 pilot 读取，用于拒绝会话结束后的指令
#[derive(Debug)]
pub struct AtomicBalancePhase {
    inner: AtomicU8,
}

impl AtomicBalancePhase {
    pub fn new(phase: BalancePhase) -> Self {
        Self {
            inner: AtomicU8::new(phase.as_u8()),
        }
    }

    /// 获取当前阶段
    pub fn get(&self, ordering: Ordering) -> BalancePhase {
        BalancePhase::from_u8(self.inner.load(ordering))
    }

    /// 设置阶段
    pub fn set(&self, phase: BalancePhase, ordering: Ordering) {
        self.inner.store(phase.as_u8(), ordering);
    }

    /// 比较并交换
    ///
    /// # 返回
    ///
    /// 当前值等于 `current` 时写入 `new` 并返回 true，否则返回 false
    pub fn compare_exchange(
        &self,
        current: BalancePhase,
        new: BalancePhase,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .is_ok()
    }

    /// 进入终态（已经是终态则保持不变）
    ///
    /// # 返回
    ///
    /// 实际生效的终态
    pub fn terminate(&self, phase: BalancePhase) -> BalancePhase {
        debug_assert!(phase.is_terminal());
        let mut current = self.get(Ordering::Acquire);
        loop {
            if current.is_terminal() {
                return current;
            }
            match self.inner.compare_exchange_weak(
                current.as_u8(),
                phase.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return phase,
                Err(actual) => current = BalancePhase::from_u8(actual),
            }
        }
    }
}

impl Default for AtomicBalancePhase {
    fn default() -> Self {
        Self::new(BalancePhase::default())
    }
}

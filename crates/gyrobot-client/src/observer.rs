//! 运动观察者
//!
//! 观察者在运动开始和完成时被同步调用。完成回调运行在调节线程上
//! （`stop()` 触发的运行在调用方线程上），运动单元格的锁已经释放，
//! 但回调仍然必须尽快返回，耗时处理应转发到 channel。
//!
//! # 使用示例
//!
//! ```rust
//! use gyrobot_client::observer::{ChannelObserver, MoveEvent, MoveObserver};
//! use std::sync::Arc;
//!
//! let (observer, rx) = ChannelObserver::new();
//! let observer: Arc<dyn MoveObserver> = Arc::new(observer);
//! // pilot.add_observer(observer);
//! # drop(observer);
//! # assert!(rx.try_recv().is_err());
//! ```

use crate::movement::Move;
use crate::pilot::PilotHandle;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;

/// 运动观察者
pub trait MoveObserver: Send + Sync {
    /// 运动开始（计划值）
    fn on_move_started(&self, started: &Move, pilot: &PilotHandle) {
        let _ = (started, pilot);
    }

    /// 运动完成或被停止（实际完成量）
    fn on_move_completed(&self, completed: &Move, pilot: &PilotHandle);
}

/// 观察者注册表
///
/// 只追加不删除。列表本身不是线程安全的，由 `PilotCore` 放在 `RwLock` 里。
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn MoveObserver>>,
}

impl ObserverRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Arc<dyn MoveObserver>) {
        self.observers.push(observer);
    }

    /// 当前观察者列表的拷贝，用于在锁外逐个回调
    pub fn snapshot(&self) -> Vec<Arc<dyn MoveObserver>> {
        self.observers.clone()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("len", &self.observers.len())
            .finish()
    }
}

/// 观察者事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveEvent {
    Started(Move),
    Completed(Move),
}

/// 把回调转发到 channel 的观察者
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<MoveEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<MoveEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl MoveObserver for ChannelObserver {
    fn on_move_started(&self, started: &Move, _pilot: &PilotHandle) {
        let _ = self.sender.send(MoveEvent::Started(*started));
    }

    fn on_move_completed(&self, completed: &Move, _pilot: &PilotHandle) {
        let _ = self.sender.send(MoveEvent::Completed(*completed));
    }
}

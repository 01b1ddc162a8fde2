//! Event Bus：多个 Actor 并发访问的唯一共享结构
//!
//! - Notification：每个订阅者一个无界 mpsc 通道，发布方从不阻塞、从不丢弃；
//!   对每个存活订阅者至少投递一次，已关闭的订阅者在发布时剔除。
//! - 遥测事件：broadcast 通道，发完即走；观察者跟不上时丢弃的是它自己的旧事件。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};

use crate::events::HiveEvent;
use crate::model::Notification;

struct Inner {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
    telemetry: broadcast::Sender<HiveEvent>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// capacity：遥测 broadcast 通道的缓冲大小
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                telemetry,
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<Notification>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 订阅 Notification
    pub fn subscribe_notifications(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    /// 发布 Notification，返回投递到的订阅者数量
    pub fn publish_notification(&self, notification: &Notification) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
        subscribers.len()
    }

    pub fn notification_subscribers(&self) -> usize {
        self.subscribers().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// 订阅遥测事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<HiveEvent> {
        self.inner.telemetry.subscribe()
    }

    /// 发出遥测事件（无观察者时直接丢弃）
    pub fn emit(&self, event: HiveEvent) {
        let _ = self.inner.telemetry.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

use serde_json::Value;
use tokio::sync::broadcast;

/// 进程内自定义事件
#[derive(Clone, Debug)]
pub struct FlowEvent {
    pub name: String,
    pub data: Value,
}

/// 自定义事件总线（tokio broadcast）
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发出事件，返回收到事件的订阅者数量
    pub fn emit(&self, name: impl Into<String>, data: Value) -> usize {
        self.sender
            .send(FlowEvent {
                name: name.into(),
                data,
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

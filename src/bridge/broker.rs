use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

/// 从 broker 收到的一条消息
#[derive(Clone, Debug)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Value,
}

/// 主题消息 broker 接口
///
/// `subscribe` 对同一 topic 可重复调用；`messages` 返回已订阅 topic 上的入站消息流。
#[async_trait]
pub trait TopicBroker: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;
    async fn publish(&self, topic: &str, payload: Value) -> Result<()>;
    fn messages(&self) -> broadcast::Receiver<BrokerMessage>;
}

/// 进程内 broker，只投递已订阅 topic 的消息
pub struct MemoryBroker {
    subscriptions: RwLock<HashSet<String>>,
    sender: broadcast::Sender<BrokerMessage>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscriptions: RwLock::new(HashSet::new()),
            sender,
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.read().contains(topic)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().iter().cloned().collect();
        topics.sort();
        topics
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicBroker for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscriptions.write().insert(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        if !self.is_subscribed(topic) {
            return Ok(());
        }
        // 没有接收者时 send 返回错误，等同于丢弃
        let _ = self.sender.send(BrokerMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    fn messages(&self) -> broadcast::Receiver<BrokerMessage> {
        self.sender.subscribe()
    }
}

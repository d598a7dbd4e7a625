use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::flow::nodes::NodeDefinition;
use crate::flow::types::{Flow, NodeState};
use super::store::ContextStore;

/// 挂起机制（每种机制一个独立的键命名空间）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitKind {
    Message,
    HttpCallback,
    Event,
}

impl WaitKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            WaitKind::Message => "message_wait",
            WaitKind::HttpCallback => "http_callback",
            WaitKind::Event => "event_wait",
        }
    }

    /// 按名字（topic / 事件名）反查关联 ID 的索引前缀
    fn index_prefix(&self) -> Option<&'static str> {
        match self {
            WaitKind::Message => Some("message_topic"),
            WaitKind::Event => Some("event_index"),
            WaitKind::HttpCallback => None,
        }
    }

    pub fn key(&self, correlation_id: &str) -> String {
        format!("{}:{correlation_id}", self.prefix())
    }
}

/// 等待条目：挂起节点恢复所需的快照
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitEntry {
    pub flow: Flow,
    pub node_def: NodeDefinition,
    pub node_state: NodeState,
}

const TOPICS_KEY: &str = "message_topics";

/// 等待条目注册表
///
/// 与上下文共用同一个 `ContextStore`，索引的读改写由进程内互斥锁串行化。
pub struct WaitRegistry {
    store: Arc<dyn ContextStore>,
    index_lock: Mutex<()>,
}

impl WaitRegistry {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            index_lock: Mutex::new(()),
        }
    }

    pub fn listener_key(tenant_id: &str, flow_id: &str, node_id: &str) -> String {
        format!("http_wait:{tenant_id}:{flow_id}:{node_id}")
    }

    /// 写入等待条目；message / event 同时登记到名字索引
    pub async fn register(
        &self,
        kind: WaitKind,
        correlation_id: &str,
        name: Option<&str>,
        entry: &WaitEntry,
        ttl: Duration,
    ) -> Result<()> {
        self.put(kind, correlation_id, entry, ttl).await?;
        if let Some(name) = name {
            self.index_add(kind, name, correlation_id).await?;
        }
        Ok(())
    }

    pub async fn put(
        &self,
        kind: WaitKind,
        correlation_id: &str,
        entry: &WaitEntry,
        ttl: Duration,
    ) -> Result<()> {
        let raw = serde_json::to_string(entry)?;
        self.store
            .set(&kind.key(correlation_id), raw, Some(ttl))
            .await
    }

    pub async fn peek(&self, kind: WaitKind, correlation_id: &str) -> Result<Option<WaitEntry>> {
        let raw = self.store.get(&kind.key(correlation_id)).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// 原子认领：同一条目只会被取走一次
    pub async fn take(&self, kind: WaitKind, correlation_id: &str) -> Result<Option<WaitEntry>> {
        let raw = self.store.take(&kind.key(correlation_id)).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    pub async fn remove(&self, kind: WaitKind, correlation_id: &str) -> Result<()> {
        self.store.delete(&kind.key(correlation_id)).await
    }

    /// 名字索引中的关联 ID（登记顺序）
    pub async fn waiting_on(&self, kind: WaitKind, name: &str) -> Result<Vec<String>> {
        match kind.index_prefix() {
            Some(prefix) => self.read_list(&format!("{prefix}:{name}")).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn index_remove(&self, kind: WaitKind, name: &str, correlation_id: &str) -> Result<()> {
        let Some(prefix) = kind.index_prefix() else {
            return Ok(());
        };
        let key = format!("{prefix}:{name}");
        let _guard = self.index_lock.lock().await;
        let mut ids = self.read_list(&key).await?;
        ids.retain(|id| id != correlation_id);
        if !ids.is_empty() {
            return self.write_list(&key, &ids).await;
        }
        self.store.delete(&key).await?;
        // topic 上已无等待者，重启后不再需要恢复订阅
        if kind == WaitKind::Message {
            let mut topics = self.read_list(TOPICS_KEY).await?;
            let before = topics.len();
            topics.retain(|topic| topic != name);
            if topics.len() != before {
                self.write_list(TOPICS_KEY, &topics).await?;
            }
        }
        Ok(())
    }

    async fn index_add(&self, kind: WaitKind, name: &str, correlation_id: &str) -> Result<()> {
        let Some(prefix) = kind.index_prefix() else {
            return Ok(());
        };
        let key = format!("{prefix}:{name}");
        let _guard = self.index_lock.lock().await;
        let mut ids = self.read_list(&key).await?;
        if !ids.iter().any(|id| id == correlation_id) {
            ids.push(correlation_id.to_string());
            self.write_list(&key, &ids).await?;
        }
        Ok(())
    }

    /// 记录订阅过的 topic，返回是否为新 topic
    pub async fn record_topic(&self, topic: &str) -> Result<bool> {
        let _guard = self.index_lock.lock().await;
        let mut topics = self.read_list(TOPICS_KEY).await?;
        if topics.iter().any(|t| t == topic) {
            return Ok(false);
        }
        topics.push(topic.to_string());
        self.write_list(TOPICS_KEY, &topics).await?;
        Ok(true)
    }

    pub async fn topics(&self) -> Result<Vec<String>> {
        self.read_list(TOPICS_KEY).await
    }

    /// httpListener 的等待标记（仅表示存在）
    pub async fn mark_listener(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.store
            .set(
                &Self::listener_key(tenant_id, flow_id, node_id),
                "true".to_string(),
                Some(ttl),
            )
            .await
    }

    pub async fn take_listener(&self, tenant_id: &str, flow_id: &str, node_id: &str) -> Result<bool> {
        Ok(self
            .store
            .take(&Self::listener_key(tenant_id, flow_id, node_id))
            .await?
            .is_some())
    }

    pub async fn clear_listener(&self, tenant_id: &str, flow_id: &str, node_id: &str) -> Result<()> {
        self.store
            .delete(&Self::listener_key(tenant_id, flow_id, node_id))
            .await
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_list(&self, key: &str, ids: &[String]) -> Result<()> {
        self.store
            .set(key, serde_json::to_string(ids)?, None)
            .await
    }
}

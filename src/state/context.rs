use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use super::store::ContextStore;

/// Flow 上下文（与 Flow 聚合分开存储）
///
/// `data` 按约定使用 `{nodeId}_result` / `{nodeId}_input` 作为键。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub flow_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl FlowContext {
    pub fn new(tenant_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow_id.into(),
            tenant_id: tenant_id.into(),
            data: Map::new(),
            started_at: now,
            last_updated_at: now,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 浅合并：只覆盖 patch 中出现的键
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.data.insert(key, value);
        }
        self.last_updated_at = Utc::now();
    }

    pub fn data_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// 上下文读写，键为 `flow_context:{tenant}:{flow}`，每次写入刷新 TTL
#[derive(Clone)]
pub struct ContextManager {
    store: Arc<dyn ContextStore>,
    ttl: Duration,
}

impl ContextManager {
    pub fn new(store: Arc<dyn ContextStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(tenant_id: &str, flow_id: &str) -> String {
        format!("flow_context:{tenant_id}:{flow_id}")
    }

    pub fn store(&self) -> Arc<dyn ContextStore> {
        Arc::clone(&self.store)
    }

    /// 初始化上下文（覆盖已有上下文）
    pub async fn init(
        &self,
        tenant_id: &str,
        flow_id: &str,
        data: Map<String, Value>,
    ) -> Result<FlowContext> {
        let mut context = FlowContext::new(tenant_id, flow_id);
        context.data = data;
        self.save(&context).await?;
        debug!(tenant = tenant_id, flow = flow_id, "flow context initialized");
        Ok(context)
    }

    pub async fn get(&self, tenant_id: &str, flow_id: &str) -> Result<Option<FlowContext>> {
        let raw = self.store.get(&Self::key(tenant_id, flow_id)).await?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(Into::into))
            .transpose()
    }

    /// 上下文数据；不存在时返回空对象
    pub async fn data(&self, tenant_id: &str, flow_id: &str) -> Result<Value> {
        Ok(self
            .get(tenant_id, flow_id)
            .await?
            .map(|context| context.data_value())
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// 浅合并更新；上下文不存在（或已过期）时新建
    pub async fn update(
        &self,
        tenant_id: &str,
        flow_id: &str,
        patch: Map<String, Value>,
    ) -> Result<FlowContext> {
        let mut context = self
            .get(tenant_id, flow_id)
            .await?
            .unwrap_or_else(|| FlowContext::new(tenant_id, flow_id));
        context.merge(patch);
        self.save(&context).await?;
        Ok(context)
    }

    /// 合并单个键
    pub async fn set_value(
        &self,
        tenant_id: &str,
        flow_id: &str,
        key: String,
        value: Value,
    ) -> Result<FlowContext> {
        let mut patch = Map::new();
        patch.insert(key, value);
        self.update(tenant_id, flow_id, patch).await
    }

    async fn save(&self, context: &FlowContext) -> Result<()> {
        let raw = serde_json::to_string(context)?;
        self.store
            .set(
                &Self::key(&context.tenant_id, &context.flow_id),
                raw,
                Some(self.ttl),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn update_is_a_shallow_merge() {
        let manager = ContextManager::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        manager
            .init("t", "f", patch(json!({"a": 1, "nested": {"x": 1}})))
            .await
            .unwrap();
        manager
            .update("t", "f", patch(json!({"b": 2, "nested": {"y": 2}})))
            .await
            .unwrap();

        let data = manager.data("t", "f").await.unwrap();
        assert_eq!(data, json!({"a": 1, "b": 2, "nested": {"y": 2}}));
    }

    #[tokio::test]
    async fn missing_context_reads_as_empty() {
        let manager = ContextManager::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        assert!(manager.get("t", "none").await.unwrap().is_none());
        assert_eq!(manager.data("t", "none").await.unwrap(), json!({}));
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{FlowEngineError, Result};
use crate::flow::types::{Flow, FlowStatus};

/// Flow 聚合的持久化接口，以 `(tenantId, flowId)` 寻址
///
/// `save_flow` 需要比较版本号：存储中的版本与 `flow.version` 不一致时返回
/// `VersionConflict`，成功后版本号加一。
#[async_trait]
pub trait FlowRepository: Send + Sync {
    async fn get_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Option<Flow>>;
    async fn save_flow(&self, flow: &mut Flow) -> Result<()>;
    /// 仅凭 flowId 查找（外部完成回调不携带租户）
    async fn find_by_flow_id(&self, flow_id: &str) -> Result<Option<Flow>>;
    /// 整体状态为 running 的流程
    async fn running_flows(&self) -> Result<Vec<Flow>>;
}

/// 内存仓库实现
#[derive(Default)]
pub struct MemoryFlowRepository {
    flows: RwLock<HashMap<(String, String), Flow>>,
}

impl MemoryFlowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入（不做版本检查），用于注册流程定义
    pub fn insert(&self, flow: Flow) {
        self.flows
            .write()
            .insert((flow.tenant_id.clone(), flow.flow_id.clone()), flow);
    }

    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }
}

#[async_trait]
impl FlowRepository for MemoryFlowRepository {
    async fn get_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Option<Flow>> {
        Ok(self
            .flows
            .read()
            .get(&(tenant_id.to_string(), flow_id.to_string()))
            .cloned())
    }

    async fn save_flow(&self, flow: &mut Flow) -> Result<()> {
        let mut flows = self.flows.write();
        let key = (flow.tenant_id.clone(), flow.flow_id.clone());
        if let Some(stored) = flows.get(&key) {
            if stored.version != flow.version {
                return Err(FlowEngineError::VersionConflict {
                    tenant: flow.tenant_id.clone(),
                    flow: flow.flow_id.clone(),
                });
            }
        }
        flow.version += 1;
        flow.updated_at = Utc::now();
        flows.insert(key, flow.clone());
        Ok(())
    }

    async fn find_by_flow_id(&self, flow_id: &str) -> Result<Option<Flow>> {
        Ok(self
            .flows
            .read()
            .values()
            .find(|flow| flow.flow_id == flow_id)
            .cloned())
    }

    async fn running_flows(&self) -> Result<Vec<Flow>> {
        Ok(self
            .flows
            .read()
            .values()
            .filter(|flow| flow.overall_status == FlowStatus::Running)
            .cloned()
            .collect())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;

    use crate::state::store::redis::with_retry;

    const FLOWS_SET: &str = "flows";

    /// 版本比较后写入；返回 0 表示版本冲突
    const SAVE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local stored = cjson.decode(current)
  if tonumber(stored['version'] or 0) ~= tonumber(ARGV[1]) then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('SADD', KEYS[3], ARGV[3] .. ':' .. ARGV[4])
return 1
"#;

    /// Redis 仓库：`flow:{tenant}:{flow}` 保存 JSON，`flow_tenant:{flow}` 反查租户
    pub struct RedisFlowRepository {
        client: ::redis::Client,
        save_script: ::redis::Script,
    }

    impl RedisFlowRepository {
        pub fn new(client: ::redis::Client) -> Self {
            Self {
                client,
                save_script: ::redis::Script::new(SAVE_SCRIPT),
            }
        }

        pub fn open(url: &str) -> Result<Self> {
            let client =
                ::redis::Client::open(url).map_err(|e| FlowEngineError::Store(e.to_string()))?;
            Ok(Self::new(client))
        }

        fn flow_key(tenant_id: &str, flow_id: &str) -> String {
            format!("flow:{tenant_id}:{flow_id}")
        }

        fn tenant_key(flow_id: &str) -> String {
            format!("flow_tenant:{flow_id}")
        }

        async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowEngineError::Store(e.to_string()))
        }

        async fn get_raw(&self, key: &str) -> Result<Option<String>> {
            let conn = self.connection().await?;
            with_retry(|| {
                let mut conn = conn.clone();
                async move { ::redis::cmd("GET").arg(key).query_async(&mut conn).await }
            })
            .await
        }
    }

    #[async_trait]
    impl FlowRepository for RedisFlowRepository {
        async fn get_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Option<Flow>> {
            let raw = self.get_raw(&Self::flow_key(tenant_id, flow_id)).await?;
            Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
        }

        async fn save_flow(&self, flow: &mut Flow) -> Result<()> {
            let expected = flow.version;
            let mut next = flow.clone();
            next.version += 1;
            next.updated_at = Utc::now();
            let raw = serde_json::to_string(&next)?;

            let conn = self.connection().await?;
            let flow_key = Self::flow_key(&flow.tenant_id, &flow.flow_id);
            let tenant_key = Self::tenant_key(&flow.flow_id);
            let saved: i64 = with_retry(|| {
                let mut conn = conn.clone();
                let mut invocation = self.save_script.prepare_invoke();
                invocation
                    .key(&flow_key)
                    .key(&tenant_key)
                    .key(FLOWS_SET)
                    .arg(expected)
                    .arg(&raw)
                    .arg(&flow.tenant_id)
                    .arg(&flow.flow_id);
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

            if saved == 0 {
                return Err(FlowEngineError::VersionConflict {
                    tenant: flow.tenant_id.clone(),
                    flow: flow.flow_id.clone(),
                });
            }
            *flow = next;
            Ok(())
        }

        async fn find_by_flow_id(&self, flow_id: &str) -> Result<Option<Flow>> {
            match self.get_raw(&Self::tenant_key(flow_id)).await? {
                Some(tenant_id) => self.get_flow(&tenant_id, flow_id).await,
                None => Ok(None),
            }
        }

        async fn running_flows(&self) -> Result<Vec<Flow>> {
            let conn = self.connection().await?;
            let members: Vec<String> = with_retry(|| {
                let mut conn = conn.clone();
                async move { ::redis::cmd("SMEMBERS").arg(FLOWS_SET).query_async(&mut conn).await }
            })
            .await?;

            let mut flows = Vec::new();
            for member in members {
                let Some((tenant_id, flow_id)) = member.split_once(':') else {
                    continue;
                };
                if let Some(flow) = self.get_flow(tenant_id, flow_id).await? {
                    if flow.overall_status == FlowStatus::Running {
                        flows.push(flow);
                    }
                }
            }
            Ok(flows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::FlowDefinition;

    #[tokio::test]
    async fn stale_saves_are_rejected() {
        let repo = MemoryFlowRepository::new();
        repo.insert(Flow::new("t", "f", FlowDefinition::default()));

        let mut first = repo.get_flow("t", "f").await.unwrap().unwrap();
        let mut second = first.clone();

        repo.save_flow(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        let err = repo.save_flow(&mut second).await.unwrap_err();
        assert!(matches!(err, FlowEngineError::VersionConflict { .. }));

        repo.save_flow(&mut first).await.unwrap();
        assert_eq!(repo.get_flow("t", "f").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn finds_by_flow_id_and_status() {
        let repo = MemoryFlowRepository::new();
        let mut running = Flow::new("t1", "a", FlowDefinition::default());
        running.overall_status = FlowStatus::Running;
        repo.insert(running);
        repo.insert(Flow::new("t2", "b", FlowDefinition::default()));

        assert_eq!(
            repo.find_by_flow_id("b").await.unwrap().unwrap().tenant_id,
            "t2"
        );
        let flows = repo.running_flows().await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].flow_id, "a");
    }
}

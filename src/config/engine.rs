use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flow::constants::defaults;

/// 引擎配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// 上下文 TTL（秒），每次写入刷新
    pub context_ttl_secs: u64,
    /// 未配置 timeout 的等待节点使用的 TTL（秒）
    pub default_wait_timeout_secs: u64,
    pub http_listener_ttl_secs: u64,
    /// 单次驱动最多执行的节点数
    pub max_steps: u32,
    pub external_queue: String,
    pub python_queue_prefix: String,
    pub reaper_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_ttl_secs: defaults::CONTEXT_TTL_SECS,
            default_wait_timeout_secs: defaults::WAIT_TIMEOUT_SECS,
            http_listener_ttl_secs: defaults::HTTP_LISTENER_TTL_SECS,
            max_steps: defaults::MAX_STEPS,
            external_queue: defaults::EXTERNAL_QUEUE.to_string(),
            python_queue_prefix: defaults::PYTHON_QUEUE_PREFIX.to_string(),
            reaper_interval_secs: defaults::REAPER_INTERVAL_SECS,
        }
    }
}

impl EngineConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }

    /// 节点配置的超时（秒）优先，否则使用默认等待超时
    pub fn wait_ttl(&self, configured: Option<u64>) -> Duration {
        Duration::from_secs(configured.unwrap_or(self.default_wait_timeout_secs))
    }

    pub fn http_listener_ttl(&self) -> Duration {
        Duration::from_secs(self.http_listener_ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    /// `{prefix}_{tenant}`
    pub fn python_queue(&self, tenant_id: &str) -> String {
        format!("{}_{tenant_id}", self.python_queue_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"maxSteps": 50, "pythonQueuePrefix": "pythonQueue"}"#)
            .unwrap();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.context_ttl_secs, 86_400);
        assert_eq!(config.python_queue("tenant1"), "pythonQueue_tenant1");
        assert_eq!(config.wait_ttl(None), Duration::from_secs(3_600));
        assert_eq!(config.wait_ttl(Some(5)), Duration::from_secs(5));
    }
}

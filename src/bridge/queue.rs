use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

/// 外部任务队列（仅生产端）
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn push(&self, queue: &str, task: Value) -> Result<()>;
}

/// 内存队列，供测试与单进程部署查看已投递任务
#[derive(Default)]
pub struct MemoryTaskQueue {
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self, queue: &str) -> Option<Value> {
        self.queues.lock().get_mut(queue)?.pop_front()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn snapshot(&self, queue: &str) -> Vec<Value> {
        self.queues
            .lock()
            .get(queue)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn push(&self, queue: &str, task: Value) -> Result<()> {
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(task);
        Ok(())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;

    use crate::error::FlowEngineError;
    use crate::state::store_retry as with_retry;

    /// Redis 列表队列（RPUSH）
    pub struct RedisTaskQueue {
        client: ::redis::Client,
    }

    impl RedisTaskQueue {
        pub fn new(client: ::redis::Client) -> Self {
            Self { client }
        }

        pub fn open(url: &str) -> Result<Self> {
            let client =
                ::redis::Client::open(url).map_err(|e| FlowEngineError::Store(e.to_string()))?;
            Ok(Self::new(client))
        }
    }

    #[async_trait]
    impl TaskQueue for RedisTaskQueue {
        async fn push(&self, queue: &str, task: Value) -> Result<()> {
            let raw = serde_json::to_string(&task)?;
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowEngineError::Store(e.to_string()))?;
            with_retry(|| {
                let mut conn = conn.clone();
                let mut cmd = ::redis::cmd("RPUSH");
                cmd.arg(queue).arg(&raw);
                async move { cmd.query_async::<()>(&mut conn).await }
            })
            .await
        }
    }
}

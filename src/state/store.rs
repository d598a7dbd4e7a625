use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

/// 键值存储 trait（上下文、等待条目共用同一后端，按键前缀区分命名空间）
///
/// 值统一为序列化后的 JSON 字符串；`ttl` 为 `None` 时永不过期，每次写入都会刷新过期时间。
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// 原子地读取并删除
    async fn take(&self, key: &str) -> Result<Option<String>>;
}

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// 内存存储实现
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理已过期的键，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, stored| stored.is_live(now));
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .values()
            .filter(|stored| stored.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .inner
            .read()
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.inner
            .write()
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .inner
            .write()
            .remove(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value))
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use std::future::Future;

    use tracing::warn;

    use crate::error::FlowEngineError;

    const MAX_ATTEMPTS: u32 = 3;
    const RETRY_DELAY: Duration = Duration::from_millis(100);

    /// 有限次重试，线性退避
    pub(crate) async fn with_retry<T, F, Fut>(operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ::redis::RedisResult<T>>,
    {
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(attempt, error = %err, "Redis operation failed, retrying");
                    last_error = Some(err);
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
            }
        }
        Err(FlowEngineError::Store(format!(
            "operation failed after {MAX_ATTEMPTS} attempts: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub struct RedisStore {
        client: ::redis::Client,
    }

    impl RedisStore {
        pub fn new(client: ::redis::Client) -> Self {
            Self { client }
        }

        pub fn open(url: &str) -> Result<Self> {
            let client =
                ::redis::Client::open(url).map_err(|e| FlowEngineError::Store(e.to_string()))?;
            Ok(Self::new(client))
        }

        async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowEngineError::Store(e.to_string()))
        }
    }

    #[async_trait]
    impl ContextStore for RedisStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let conn = self.connection().await?;
            with_retry(|| {
                let mut conn = conn.clone();
                async move { ::redis::cmd("GET").arg(key).query_async(&mut conn).await }
            })
            .await
        }

        async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
            let conn = self.connection().await?;
            with_retry(|| {
                let mut conn = conn.clone();
                let mut cmd = ::redis::cmd("SET");
                cmd.arg(key).arg(&value);
                if let Some(ttl) = ttl {
                    cmd.arg("EX").arg(ttl.as_secs().max(1));
                }
                async move { cmd.query_async::<()>(&mut conn).await }
            })
            .await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let conn = self.connection().await?;
            with_retry(|| {
                let mut conn = conn.clone();
                async move { ::redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await }
            })
            .await
        }

        async fn take(&self, key: &str) -> Result<Option<String>> {
            let conn = self.connection().await?;
            with_retry(|| {
                let mut conn = conn.clone();
                async move { ::redis::cmd("GETDEL").arg(key).query_async(&mut conn).await }
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ttl_expires_values() {
        let store = MemoryStore::new();
        store
            .set("short", "1".into(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("forever", "2".into(), None).await.unwrap();
        assert_eq!(store.get("short").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn take_removes_exactly_once() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(store.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let store = MemoryStore::new();
        store
            .set("k", "v".into(), Some(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.purge_expired(), 0);
    }
}

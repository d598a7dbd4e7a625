use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 按 `(tenantId, flowId)` 串行化读-改-写
#[derive(Default)]
pub struct FlowLocks {
    locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
}

impl FlowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: &str, flow_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // 无人持有的锁可以回收
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((tenant_id.to_string(), flow_id.to_string()))
                    .or_default(),
            )
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_flow_is_serialized() {
        let locks = Arc::new(FlowLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.acquire("t", "f").await;
        let task = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.acquire("t", "f").await;
                order.lock().push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().push("first");
        drop(guard);
        task.await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn other_flows_do_not_block() {
        let locks = FlowLocks::new();
        let _a = locks.acquire("t", "a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("t", "b"))
            .await
            .unwrap();
    }
}

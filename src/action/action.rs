use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;

/// 节点动作：接收 `{...input, context}`，返回节点结果
#[async_trait]
pub trait NodeAction: Send + Sync {
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// 动作解析：按 `(nodeId, type)` 查找可执行的动作，找不到返回 `None`
pub trait ActionResolver: Send + Sync {
    fn resolve(&self, node_id: &str, node_type: &str) -> Option<Arc<dyn NodeAction>>;
}

struct FnAction<F> {
    func: F,
}

#[async_trait]
impl<F> NodeAction for FnAction<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync,
{
    async fn execute(&self, input: Value) -> Result<Value> {
        (self.func)(input).await
    }
}

/// 从异步函数创建动作
pub fn action_from_fn<F>(func: F) -> Arc<dyn NodeAction>
where
    F: Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
{
    Arc::new(FnAction { func })
}

struct SyncAction<F> {
    func: F,
}

#[async_trait]
impl<F> NodeAction for SyncAction<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn execute(&self, input: Value) -> Result<Value> {
        (self.func)(input)
    }
}

/// 从同步函数创建动作
pub fn action_from_sync_fn<F>(func: F) -> Arc<dyn NodeAction>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(SyncAction { func })
}

/// 直通动作：原样返回去掉 `context` 的输入
pub struct PassThrough;

#[async_trait]
impl NodeAction for PassThrough {
    async fn execute(&self, mut input: Value) -> Result<Value> {
        if let Value::Object(map) = &mut input {
            map.remove(crate::flow::constants::fields::CONTEXT);
        }
        Ok(input)
    }
}

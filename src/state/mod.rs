// 状态管理模块：上下文、等待条目与流程持久化

mod context;
mod repository;
mod store;
mod wait;

pub use context::{ContextManager, FlowContext};
#[cfg(feature = "redis-store")]
pub use repository::redis::RedisFlowRepository;
pub use repository::{FlowRepository, MemoryFlowRepository};
#[cfg(feature = "redis-store")]
pub use store::redis::RedisStore;
pub use store::{ContextStore, MemoryStore};
pub use wait::{WaitEntry, WaitKind, WaitRegistry};
#[cfg(feature = "redis-store")]
pub(crate) use store::redis::with_retry as store_retry;

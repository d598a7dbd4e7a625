// 挂起机制的外部协作者：消息 broker、事件总线、任务队列与 HTTP 客户端

pub mod broker;
pub mod events;
pub mod http;
pub mod queue;

pub use broker::{BrokerMessage, MemoryBroker, TopicBroker};
pub use events::{EventBus, FlowEvent};
#[cfg(feature = "http-client")]
pub use http::ReqwestHttpClient;
pub use http::{HttpClient, HttpRequest};
#[cfg(feature = "redis-store")]
pub use queue::redis::RedisTaskQueue;
pub use queue::{MemoryTaskQueue, TaskQueue};

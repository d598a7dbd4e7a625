// 运行时执行引擎模块

mod dispatch;
mod engine;
mod handlers;
mod listeners;
mod lock;
mod types;

pub use dispatch::Handler;
pub use engine::FlowEngine;
pub use listeners::{spawn_event_listener, spawn_message_listener, spawn_reaper};
pub use lock::FlowLocks;
pub use types::{ExternalTask, PythonTask};

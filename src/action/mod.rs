// 节点动作模块

mod action;
mod registry;

pub use action::{action_from_fn, action_from_sync_fn, ActionResolver, NodeAction, PassThrough};
pub use registry::ActionRegistry;

use std::collections::HashMap;
use std::sync::Arc;

use crate::flow::constants::node_types;

use super::action::{ActionResolver, NodeAction, PassThrough};

/// 动作注册表：先按节点 ID 查找，再按节点类型查找
#[derive(Clone, Default)]
pub struct ActionRegistry {
    by_node: HashMap<String, Arc<dyn NodeAction>>,
    by_type: HashMap<String, Arc<dyn NodeAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `start` / `end` 的直通动作
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_type(node_types::START, Arc::new(PassThrough));
        registry.register_type(node_types::END, Arc::new(PassThrough));
        registry
    }

    pub fn register_type(&mut self, node_type: &str, action: Arc<dyn NodeAction>) -> &mut Self {
        self.by_type.insert(node_type.to_string(), action);
        self
    }

    pub fn register_node(&mut self, node_id: &str, action: Arc<dyn NodeAction>) -> &mut Self {
        self.by_node.insert(node_id.to_string(), action);
        self
    }

    pub fn contains_type(&self, node_type: &str) -> bool {
        self.by_type.contains_key(node_type)
    }
}

impl ActionResolver for ActionRegistry {
    fn resolve(&self, node_id: &str, node_type: &str) -> Option<Arc<dyn NodeAction>> {
        self.by_node
            .get(node_id)
            .or_else(|| self.by_type.get(node_type))
            .map(Arc::clone)
    }
}

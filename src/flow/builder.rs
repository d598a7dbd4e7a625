use serde_json::Value;

use crate::error::Result;
use crate::flow::conditions::Predicate;
use crate::flow::constants::node_types;
use crate::flow::nodes::{
    Branch, DecisionCondition, EventConfig, ExecutionMode, HttpCallbackConfig, HttpEntry,
    MessageConfig, NodeDefinition,
};
use crate::flow::types::{FlowDefinition, FlowEdge};

/// 流程定义构建器
///
/// 后继关系直接写在节点上；`build` 时会按照节点的 `nextNodes` 补全设计器用的边并校验。
#[derive(Default)]
pub struct DefinitionBuilder {
    name: Option<String>,
    nodes: Vec<NodeDefinition>,
}

impl DefinitionBuilder {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: Some(name.into()),
            nodes: Vec::new(),
        }
    }

    pub fn node(&mut self, node: NodeDefinition) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn start(&mut self, id: &str, next: &[&str]) -> &mut Self {
        self.node(NodeBuilder::new(id, node_types::START).next(next).build())
    }

    pub fn end(&mut self, id: &str) -> &mut Self {
        self.node(NodeDefinition::new(id, node_types::END))
    }

    pub fn standard(&mut self, id: &str, next: &[&str]) -> &mut Self {
        self.node(NodeBuilder::new(id, node_types::STANDARD).next(next).build())
    }

    /// 决策节点：`conditions` 按顺序匹配，`fallback` 写入 `nextNodes[0]`
    pub fn decision(
        &mut self,
        id: &str,
        conditions: Vec<(Predicate, &str)>,
        fallback: Option<&str>,
    ) -> &mut Self {
        let mut node = NodeBuilder::new(id, node_types::DECISION);
        for (condition, target) in conditions {
            node = node.condition(condition, target);
        }
        if let Some(fallback) = fallback {
            node = node.next(&[fallback]);
        }
        self.node(node.build())
    }

    pub fn build(&self) -> Result<FlowDefinition> {
        let edges = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.next_nodes.iter().map(|target| FlowEdge {
                    source: node.node_id.clone(),
                    target: target.clone(),
                })
            })
            .collect();
        let definition = FlowDefinition {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            edges,
        };
        definition.validate()?;
        Ok(definition)
    }
}

/// 单个节点的构建器
pub struct NodeBuilder {
    node: NodeDefinition,
}

impl NodeBuilder {
    pub fn new(id: &str, node_type: &str) -> Self {
        Self {
            node: NodeDefinition::new(id, node_type),
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.node.execution_mode = Some(mode);
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.node.action = Some(action.to_string());
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.node.input = input;
        self
    }

    pub fn next(mut self, targets: &[&str]) -> Self {
        self.node
            .next_nodes
            .extend(targets.iter().map(|t| t.to_string()));
        self
    }

    pub fn condition(mut self, condition: Predicate, target: &str) -> Self {
        self.node.conditions.push(DecisionCondition {
            condition,
            next_node_id: target.to_string(),
        });
        self
    }

    pub fn branch(mut self, condition: Predicate, target: &str) -> Self {
        self.node.branches.push(Branch {
            condition: Some(condition),
            evaluator: None,
            target_node_id: target.to_string(),
        });
        self
    }

    /// 使用已注册的评估函数作为分支条件
    pub fn branch_with(mut self, evaluator: &str, target: &str) -> Self {
        self.node.branches.push(Branch {
            condition: None,
            evaluator: Some(evaluator.to_string()),
            target_node_id: target.to_string(),
        });
        self
    }

    pub fn manual_next(mut self, targets: &[&str]) -> Self {
        self.node
            .manual_next_nodes
            .extend(targets.iter().map(|t| t.to_string()));
        self
    }

    pub fn http_entry(mut self, url: &str, method: &str) -> Self {
        self.node.entry = Some(HttpEntry {
            url: url.to_string(),
            method: method.to_string(),
            headers: Default::default(),
            timeout: None,
        });
        self
    }

    pub fn message(mut self, topic: &str, timeout: Option<u64>) -> Self {
        self.node.message = Some(MessageConfig {
            topic: topic.to_string(),
            timeout,
        });
        self
    }

    pub fn http_callback(mut self, callback_url: &str, timeout: Option<u64>) -> Self {
        self.node.http = Some(HttpCallbackConfig {
            callback_url: callback_url.to_string(),
            timeout,
        });
        self
    }

    pub fn event(mut self, event_name: &str, timeout: Option<u64>) -> Self {
        self.node.event = Some(EventConfig {
            event_name: event_name.to_string(),
            timeout,
        });
        self
    }

    pub fn build(self) -> NodeDefinition {
        self.node
    }
}

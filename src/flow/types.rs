use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowEngineError, Result};
use crate::flow::constants::node_types;
use crate::flow::nodes::NodeDefinition;

/// Flow 核心类型定义

/// 流程整体状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Draft,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// 节点运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    ManualWait,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Waiting => "waiting",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::ManualWait => "manual_wait",
        }
    }

    /// 尚未结束（仍可能推进）的状态
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            NodeStatus::Pending | NodeStatus::Running | NodeStatus::Waiting | NodeStatus::ManualWait
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点状态（每个流程每个节点一份，首次访问时创建）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_next: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_next_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_requirements: Vec<String>,
    /// 挂起时生成的关联 ID（message / http_callback / event）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_deadline: Option<DateTime<Utc>>,
}

impl NodeState {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Pending,
            logs: Vec::new(),
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            selected_branch: None,
            selected_next: None,
            available_next_nodes: Vec::new(),
            input_requirements: Vec::new(),
            correlation_id: None,
            wait_deadline: None,
        }
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        self.logs
            .push(format!("[{}] {}", Utc::now().to_rfc3339(), message.as_ref()));
    }

    pub fn start(&mut self) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
        self.log("Node started");
    }

    pub fn complete(&mut self, result: Option<Value>) {
        self.status = NodeStatus::Completed;
        if result.is_some() {
            self.result = result;
        }
        self.error = None;
        self.wait_deadline = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.status = NodeStatus::Failed;
        self.log(format!("Error: {error}"));
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    pub fn suspend(&mut self, correlation_id: Option<String>, deadline: Option<DateTime<Utc>>) {
        self.status = NodeStatus::Waiting;
        self.correlation_id = correlation_id;
        self.wait_deadline = deadline;
    }
}

/// 定义中的边（仅用于设计器展示与校验，调度以节点上的后继列表为准）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEdge {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
}

/// 流程定义
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<FlowEdge>,
}

impl FlowDefinition {
    pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn start_node(&self) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.node_type == node_types::START)
    }

    /// 校验节点 ID 唯一且所有引用都存在；违反即为致命配置错误
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.node_id.as_str()) {
                return Err(FlowEngineError::DuplicateNode(node.node_id.clone()));
            }
        }

        for node in &self.nodes {
            for target in node.references() {
                if !ids.contains(target) {
                    return Err(FlowEngineError::InvalidReference {
                        node: node.node_id.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !ids.contains(end.as_str()) {
                    return Err(FlowEngineError::InvalidReference {
                        node: edge.source.clone(),
                        target: end.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// 流程聚合根
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub tenant_id: String,
    pub flow_id: String,
    pub definition: FlowDefinition,
    #[serde(default)]
    pub node_states: BTreeMap<String, NodeState>,
    #[serde(default)]
    pub overall_status: FlowStatus,
    /// 每次保存递增，用于检测并发覆盖
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    pub fn new(
        tenant_id: impl Into<String>,
        flow_id: impl Into<String>,
        definition: FlowDefinition,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            flow_id: flow_id.into(),
            definition,
            node_states: BTreeMap::new(),
            overall_status: FlowStatus::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node_def(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.definition.node(node_id)
    }

    pub fn state(&self, node_id: &str) -> Option<&NodeState> {
        self.node_states.get(node_id)
    }

    pub fn state_mut(&mut self, node_id: &str) -> Option<&mut NodeState> {
        self.node_states.get_mut(node_id)
    }

    /// 获取或惰性创建节点状态（初始 pending）
    pub fn ensure_state(&mut self, node_id: &str) -> &mut NodeState {
        self.node_states
            .entry(node_id.to_string())
            .or_insert_with(|| NodeState::new(node_id))
    }

    pub fn is_stopped(&self) -> bool {
        self.overall_status == FlowStatus::Stopped
    }

    /// 根据节点状态重新计算整体状态
    pub fn refresh_status(&mut self) {
        if self.is_stopped() {
            return;
        }
        let states = self.node_states.values();
        self.overall_status = if states.clone().any(|s| s.status.is_outstanding()) {
            FlowStatus::Running
        } else if states.clone().any(|s| s.status == NodeStatus::Failed) {
            FlowStatus::Failed
        } else {
            FlowStatus::Completed
        };
    }
}

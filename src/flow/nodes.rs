use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::conditions::Predicate;
use crate::flow::constants::fields;

/// Flow 节点类型定义

/// 执行模式：决定节点同步执行还是挂起等待外部信号
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Auto,
    Manual,
    WaitForInput,
    #[serde(alias = "mqtt")]
    Message,
    HttpCallback,
    Event,
    External,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Auto => "auto",
            ExecutionMode::Manual => "manual",
            ExecutionMode::WaitForInput => "wait_for_input",
            ExecutionMode::Message => "message",
            ExecutionMode::HttpCallback => "http_callback",
            ExecutionMode::Event => "event",
            ExecutionMode::External => "external",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点定义（流程启动后只读）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub node_id: String,
    #[serde(rename = "type", default = "NodeDefinition::default_type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    /// 外部 worker 使用的动作名（python 任务载荷中透传）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<DecisionCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_next_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<HttpEntry>,
    #[serde(default, alias = "mqtt", skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpCallbackConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventConfig>,
}

impl NodeDefinition {
    fn default_type() -> String {
        crate::flow::constants::node_types::STANDARD.to_string()
    }

    pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            execution_mode: None,
            action: None,
            input: Value::Null,
            next_nodes: Vec::new(),
            conditions: Vec::new(),
            branches: Vec::new(),
            manual_next_nodes: Vec::new(),
            entry: None,
            message: None,
            http: None,
            event: None,
        }
    }

    /// 所有被引用的后继节点（nextNodes / conditions / branches / manualNextNodes）
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.next_nodes
            .iter()
            .map(String::as_str)
            .chain(self.conditions.iter().map(|c| c.next_node_id.as_str()))
            .chain(self.branches.iter().map(|b| b.target_node_id.as_str()))
            .chain(self.manual_next_nodes.iter().map(String::as_str))
    }

    /// `input.requirements` 中声明的必填字段
    pub fn input_requirements(&self) -> Vec<String> {
        self.input
            .get(fields::REQUIREMENTS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 决策条件：按声明顺序评估，首个命中生效
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCondition {
    pub condition: Predicate,
    pub next_node_id: String,
}

/// 分支：所有命中的分支都会触发
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Predicate>,
    /// 已注册的评估函数名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    pub target_node_id: String,
}

/// `http` 节点的请求配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEntry {
    pub url: String,
    #[serde(default = "HttpEntry::default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// 毫秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl HttpEntry {
    fn default_method() -> String {
        "get".to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageConfig {
    pub topic: String,
    /// 秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCallbackConfig {
    pub callback_url: String,
    /// 秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    pub event_name: String,
    /// 秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

use crate::flow::constants::node_types;
use crate::flow::nodes::{ExecutionMode, NodeDefinition};

/// 节点处理器：`executionMode` 优先，未设置时按 `type` 选择
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Standard,
    Auto,
    Decision,
    Manual,
    WaitForInput,
    Message,
    HttpCallback,
    Event,
    External,
    Http,
    HttpListener,
    Python,
}

impl Handler {
    pub fn resolve(node: &NodeDefinition) -> Self {
        match node.execution_mode {
            Some(ExecutionMode::Manual) => Handler::Manual,
            Some(ExecutionMode::WaitForInput) => Handler::WaitForInput,
            Some(ExecutionMode::Auto) => Handler::Auto,
            Some(ExecutionMode::Message) => Handler::Message,
            Some(ExecutionMode::HttpCallback) => Handler::HttpCallback,
            Some(ExecutionMode::Event) => Handler::Event,
            Some(ExecutionMode::External) => Handler::External,
            Some(ExecutionMode::Sync) => Handler::Standard,
            None => match node.node_type.as_str() {
                node_types::DECISION | node_types::SWITCH => Handler::Decision,
                node_types::HTTP => Handler::Http,
                node_types::HTTP_LISTENER => Handler::HttpListener,
                node_types::PYTHON => Handler::Python,
                _ => Handler::Standard,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handler::Standard => "standard",
            Handler::Auto => "auto",
            Handler::Decision => "decision",
            Handler::Manual => "manual",
            Handler::WaitForInput => "wait_for_input",
            Handler::Message => "message",
            Handler::HttpCallback => "http_callback",
            Handler::Event => "event",
            Handler::External => "external",
            Handler::Http => "http",
            Handler::HttpListener => "http_listener",
            Handler::Python => "python",
        }
    }
}

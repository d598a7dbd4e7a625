use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 运行时类型定义

/// 推送到外部任务队列的任务
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTask {
    pub tenant_id: String,
    pub flow_id: String,
    pub node_id: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub context: Value,
}

/// 推送到 `{prefix}_{tenant}` 队列的 python 任务
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonTask {
    pub task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub input: Value,
    pub flow_id: String,
    pub tenant_id: String,
}

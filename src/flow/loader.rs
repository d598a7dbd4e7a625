use std::fs;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::error::Result;
use crate::flow::types::FlowDefinition;

/// 从 JSON 字符串加载流程定义（加载后立即校验）
pub fn load_definition_from_str(source: &str) -> Result<FlowDefinition> {
    let definition: FlowDefinition = serde_json::from_str(source)?;
    definition.validate()?;
    Ok(definition)
}

pub fn load_definition_from_value(value: &Value) -> Result<FlowDefinition> {
    let definition: FlowDefinition = serde_json::from_value(value.clone())?;
    definition.validate()?;
    Ok(definition)
}

/// 从文件加载流程定义
pub fn load_definition_from_path(path: impl AsRef<Path>) -> Result<FlowDefinition> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read flow definition {}", path.display()))?;
    load_definition_from_str(&source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowEngineError;
    use crate::flow::nodes::ExecutionMode;
    use serde_json::json;

    #[test]
    fn loads_camel_case_definition_with_legacy_mqtt_block() {
        let definition = load_definition_from_value(&json!({
            "name": "listener",
            "nodes": [
                {"nodeId": "start", "type": "start", "nextNodes": ["wait"]},
                {
                    "nodeId": "wait",
                    "executionMode": "mqtt",
                    "mqtt": {"topic": "sensors/temp", "timeout": 30},
                    "nextNodes": ["end"]
                },
                {"nodeId": "end", "type": "end"}
            ],
            "edges": [{"from": "start", "to": "wait"}]
        }))
        .unwrap();

        let wait = definition.node("wait").unwrap();
        assert_eq!(wait.execution_mode, Some(ExecutionMode::Message));
        assert_eq!(wait.message.as_ref().unwrap().topic, "sensors/temp");
        assert_eq!(wait.node_type, "standard");
        assert_eq!(definition.edges[0].target, "wait");
    }

    #[test]
    fn rejects_dangling_references() {
        let err = load_definition_from_str(
            r#"{"nodes": [{"nodeId": "start", "type": "start", "nextNodes": ["ghost"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FlowEngineError::InvalidReference { ref target, .. } if target == "ghost"
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = load_definition_from_value(&json!({
            "nodes": [
                {"nodeId": "a", "type": "start"},
                {"nodeId": "a", "type": "end"}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, FlowEngineError::DuplicateNode(id) if id == "a"));
    }
}

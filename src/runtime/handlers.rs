use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::HttpRequest;
use crate::error::{FlowEngineError, Result};
use crate::flow::constants::{fields, result_key};
use crate::flow::nodes::{Branch, NodeDefinition};
use crate::flow::types::{Flow, NodeState, NodeStatus};
use crate::state::{WaitEntry, WaitKind};

use super::dispatch::Handler;
use super::engine::FlowEngine;
use super::types::{ExternalTask, PythonTask};

/// 各处理器的实现；返回值为需要继续执行的后继节点（按顺序）
impl FlowEngine {
    pub(super) async fn run_handler(
        &self,
        handler: Handler,
        flow: &mut Flow,
        node: &NodeDefinition,
    ) -> Result<Vec<String>> {
        match handler {
            Handler::Standard => self.handle_standard(flow, node).await,
            Handler::Auto => self.handle_auto(flow, node).await,
            Handler::Decision => self.handle_decision(flow, node).await,
            Handler::Manual => Ok(self.handle_manual(flow, node)),
            Handler::WaitForInput => Ok(self.handle_wait_for_input(flow, node)),
            Handler::Message => self.handle_message_wait(flow, node).await,
            Handler::HttpCallback => self.handle_http_callback_wait(flow, node).await,
            Handler::Event => self.handle_event_wait(flow, node).await,
            Handler::External => self.handle_external(flow, node).await,
            Handler::Http => self.handle_http(flow, node).await,
            Handler::HttpListener => self.handle_http_listener_wait(flow, node).await,
            Handler::Python => self.handle_python(flow, node).await,
        }
    }

    async fn handle_standard(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        flow.ensure_state(&node.node_id).start();
        let result = self.invoke_action(flow, node).await?;
        self.record_result(flow, node, result, "Node completed").await?;
        Ok(node.next_nodes.clone())
    }

    async fn handle_auto(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        flow.ensure_state(&node.node_id).start();
        let result = self.invoke_action(flow, node).await?;
        let context = self
            .context
            .set_value(
                &flow.tenant_id,
                &flow.flow_id,
                result_key(&node.node_id),
                result.clone(),
            )
            .await?
            .data_value();

        let state = flow.ensure_state(&node.node_id);
        let targets = if node.branches.is_empty() {
            if node.manual_next_nodes.is_empty() {
                node.next_nodes.clone()
            } else {
                node.manual_next_nodes.clone()
            }
        } else {
            node.branches
                .iter()
                .filter(|branch| self.branch_matches(state, branch, &context))
                .map(|branch| branch.target_node_id.clone())
                .collect()
        };

        state.complete(Some(result));
        state.log(format!("Node completed, {} branch(es) selected", targets.len()));
        Ok(targets)
    }

    /// 分支条件：谓词或已注册的评估函数；两者都没有时视为恒真。求值错误视为不匹配
    fn branch_matches(&self, state: &mut NodeState, branch: &Branch, context: &Value) -> bool {
        let outcome = match (&branch.condition, &branch.evaluator) {
            (Some(condition), _) => condition.evaluate(context, &self.predicates),
            (None, Some(name)) => self.predicates.call(name, context),
            (None, None) => Ok(true),
        };
        match outcome {
            Ok(true) => {
                let label = branch
                    .condition
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| branch.evaluator.clone())
                    .unwrap_or_else(|| "always".to_string());
                state.log(format!(
                    "Branch condition met: {label} -> {}",
                    branch.target_node_id
                ));
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(
                    node = %state.node_id,
                    target = %branch.target_node_id,
                    error = %err,
                    "branch evaluation error"
                );
                state.log(format!("Branch evaluation error: {err}"));
                false
            }
        }
    }

    async fn handle_decision(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        let context = self.context.data(&flow.tenant_id, &flow.flow_id).await?;
        let state = flow.ensure_state(&node.node_id);
        state.start();

        let mut selected = None;
        for condition in &node.conditions {
            match condition.condition.evaluate(&context, &self.predicates) {
                Ok(true) => {
                    selected = Some(condition.next_node_id.clone());
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        node = %node.node_id,
                        condition = %condition.condition,
                        error = %err,
                        "decision condition failed to evaluate"
                    );
                    state.log(format!(
                        "Condition `{}` failed to evaluate: {err}",
                        condition.condition
                    ));
                }
            }
        }

        let target = match selected {
            Some(target) => Some(target),
            None => {
                let fallback = node.next_nodes.first().cloned();
                state.log(match &fallback {
                    Some(fallback) => format!("No condition matched, falling back to {fallback}"),
                    None => "No condition matched and no fallback defined".to_string(),
                });
                fallback
            }
        };

        state.selected_branch = target.clone();
        state.complete(None);
        if let Some(target) = &target {
            state.log(format!("Decision selected {target}"));
        }
        Ok(target.into_iter().collect())
    }

    fn handle_manual(&self, flow: &mut Flow, node: &NodeDefinition) -> Vec<String> {
        let state = flow.ensure_state(&node.node_id);
        state.status = NodeStatus::ManualWait;
        state.available_next_nodes = node.manual_next_nodes.clone();
        state.log("Waiting for manual progression");
        info!(flow = %flow.flow_id, node = %node.node_id, "node awaiting manual progression");
        Vec::new()
    }

    fn handle_wait_for_input(&self, flow: &mut Flow, node: &NodeDefinition) -> Vec<String> {
        let state = flow.ensure_state(&node.node_id);
        state.suspend(None, None);
        state.input_requirements = node.input_requirements();
        state.log("Waiting for user input");
        info!(flow = %flow.flow_id, node = %node.node_id, "node awaiting user input");
        Vec::new()
    }

    async fn handle_message_wait(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
    ) -> Result<Vec<String>> {
        let config = node
            .message
            .as_ref()
            .ok_or_else(|| invalid(node, "message topic not specified"))?;
        let ttl = self.config.wait_ttl(config.timeout);
        let correlation_id = self
            .suspend_with_entry(
                flow,
                node,
                WaitKind::Message,
                Some(&config.topic),
                ttl,
                format!("Waiting for message on topic {}", config.topic),
            )
            .await?;

        self.waits.record_topic(&config.topic).await?;
        if let Some(broker) = &self.broker {
            broker.subscribe(&config.topic).await?;
        }
        info!(
            flow = %flow.flow_id,
            node = %node.node_id,
            topic = %config.topic,
            correlation_id = %correlation_id,
            "node waiting for message"
        );
        Ok(Vec::new())
    }

    async fn handle_http_callback_wait(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
    ) -> Result<Vec<String>> {
        let config = node
            .http
            .as_ref()
            .ok_or_else(|| invalid(node, "HTTP callback URL not specified"))?;
        let ttl = self.config.wait_ttl(config.timeout);
        let callback_id = self
            .suspend_with_entry(
                flow,
                node,
                WaitKind::HttpCallback,
                None,
                ttl,
                format!("Waiting for HTTP callback at {}", config.callback_url),
            )
            .await?;
        info!(
            flow = %flow.flow_id,
            node = %node.node_id,
            correlation_id = %callback_id,
            "node waiting for http callback"
        );
        Ok(Vec::new())
    }

    async fn handle_event_wait(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
    ) -> Result<Vec<String>> {
        let config = node
            .event
            .as_ref()
            .ok_or_else(|| invalid(node, "event name not specified"))?;
        let ttl = self.config.wait_ttl(config.timeout);
        let event_id = self
            .suspend_with_entry(
                flow,
                node,
                WaitKind::Event,
                Some(&config.event_name),
                ttl,
                format!("Waiting for event {}", config.event_name),
            )
            .await?;
        info!(
            flow = %flow.flow_id,
            node = %node.node_id,
            event = %config.event_name,
            correlation_id = %event_id,
            "node waiting for event"
        );
        Ok(Vec::new())
    }

    /// 节点进入 waiting 并写入快照条目，返回关联 ID
    async fn suspend_with_entry(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
        kind: WaitKind,
        name: Option<&str>,
        ttl: Duration,
        message: String,
    ) -> Result<String> {
        let correlation_id = Uuid::new_v4().to_string();
        let state = flow.ensure_state(&node.node_id);
        state.suspend(Some(correlation_id.clone()), deadline(ttl));
        state.log(message);

        let entry = WaitEntry {
            flow: flow.clone(),
            node_def: node.clone(),
            node_state: flow.ensure_state(&node.node_id).clone(),
        };
        self.waits
            .register(kind, &correlation_id, name, &entry, ttl)
            .await?;
        Ok(correlation_id)
    }

    async fn handle_external(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        let context = self.context.data(&flow.tenant_id, &flow.flow_id).await?;
        let task = ExternalTask {
            tenant_id: flow.tenant_id.clone(),
            flow_id: flow.flow_id.clone(),
            node_id: node.node_id.clone(),
            input: node.input.clone(),
            context,
        };
        self.tasks
            .push(&self.config.external_queue, serde_json::to_value(&task)?)
            .await?;

        let state = flow.ensure_state(&node.node_id);
        state.suspend(None, None);
        state.log(format!("Enqueued external task on {}", self.config.external_queue));
        info!(
            flow = %flow.flow_id,
            node = %node.node_id,
            queue = %self.config.external_queue,
            "external task enqueued"
        );
        Ok(Vec::new())
    }

    async fn handle_python(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        let queue = self.config.python_queue(&flow.tenant_id);
        let task = PythonTask {
            task_name: node.node_id.clone(),
            action: node.action.clone(),
            input: node.input.clone(),
            flow_id: flow.flow_id.clone(),
            tenant_id: flow.tenant_id.clone(),
        };
        info!(flow = %flow.flow_id, node = %node.node_id, queue = %queue, "Enqueueing Python task");
        self.tasks.push(&queue, serde_json::to_value(&task)?).await?;

        let state = flow.ensure_state(&node.node_id);
        state.suspend(None, None);
        state.log("Enqueueing Python task");
        Ok(Vec::new())
    }

    async fn handle_http_listener_wait(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
    ) -> Result<Vec<String>> {
        let ttl = self.config.http_listener_ttl();
        self.waits
            .mark_listener(&flow.tenant_id, &flow.flow_id, &node.node_id, ttl)
            .await?;
        let state = flow.ensure_state(&node.node_id);
        state.suspend(None, deadline(ttl));
        state.log("Waiting for HTTP listener callback");
        info!(flow = %flow.flow_id, node = %node.node_id, "node waiting for http listener");
        Ok(Vec::new())
    }

    async fn handle_http(&self, flow: &mut Flow, node: &NodeDefinition) -> Result<Vec<String>> {
        flow.ensure_state(&node.node_id).start();
        let entry = node
            .entry
            .as_ref()
            .ok_or_else(|| invalid(node, "HTTP entry not specified"))?;
        let client = self
            .http
            .as_ref()
            .ok_or_else(|| FlowEngineError::HttpClientMissing(node.node_id.clone()))?;

        let method = entry.method.to_lowercase();
        let body = match method.as_str() {
            "get" | "delete" => None,
            _ => Some(json!({
                "input": node.input,
                "tenantId": flow.tenant_id,
                "flowId": flow.flow_id,
            })),
        };
        let request = HttpRequest {
            method,
            url: entry.url.clone(),
            headers: entry.headers.clone(),
            body,
            timeout: entry.timeout.map(Duration::from_millis),
        };
        debug!(node = %node.node_id, url = %request.url, method = %request.method, "issuing http call");

        let result = client
            .send(request)
            .await
            .map_err(|err| FlowEngineError::HttpCall(format!("HTTP call failed: {err}")))?;
        self.record_result(flow, node, result, "HTTP call completed").await?;
        Ok(node.next_nodes.clone())
    }

    /// 解析并执行节点动作，输入为 `{...input, context}`
    async fn invoke_action(&self, flow: &Flow, node: &NodeDefinition) -> Result<Value> {
        let action = self
            .actions
            .resolve(&node.node_id, &node.node_type)
            .ok_or_else(|| FlowEngineError::ActionNotFound {
                node: node.node_id.clone(),
                node_type: node.node_type.clone(),
            })?;
        let context = self.context.data(&flow.tenant_id, &flow.flow_id).await?;
        action.execute(action_input(&node.input, context)).await
    }

    /// 节点完成：写入结果并合并 `{nodeId}_result` 到上下文
    pub(super) async fn record_result(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
        result: Value,
        message: &str,
    ) -> Result<()> {
        self.context
            .set_value(
                &flow.tenant_id,
                &flow.flow_id,
                result_key(&node.node_id),
                result.clone(),
            )
            .await?;
        let state = flow.ensure_state(&node.node_id);
        state.complete(Some(result));
        state.log(message);
        Ok(())
    }
}

/// `{...input, context}`；非对象输入放在 `input` 字段下
pub(super) fn action_input(input: &Value, context: Value) -> Value {
    let mut payload = match input {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert(fields::INPUT.to_string(), other.clone());
            map
        }
    };
    payload.insert(fields::CONTEXT.to_string(), context);
    Value::Object(payload)
}

/// 超时换算为截止时间；超出时间范围的超时视为没有截止时间
pub(super) fn deadline(ttl: Duration) -> Option<chrono::DateTime<Utc>> {
    let ttl = ChronoDuration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(ttl)
}

fn invalid(node: &NodeDefinition, reason: &str) -> FlowEngineError {
    FlowEngineError::InvalidNodeConfiguration {
        node: node.node_id.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_input_merges_context() {
        let input = action_input(&json!({"a": 1}), json!({"x": true}));
        assert_eq!(input, json!({"a": 1, "context": {"x": true}}));

        let input = action_input(&json!([1, 2]), json!({}));
        assert_eq!(input, json!({"input": [1, 2], "context": {}}));

        let input = action_input(&Value::Null, json!({}));
        assert_eq!(input, json!({"context": {}}));
    }
}

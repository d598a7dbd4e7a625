mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use common::{setup, status, Harness, FLOW, TENANT};
use flowengine::{
    spawn_event_listener, spawn_message_listener, spawn_reaper, DefinitionBuilder, EventBus,
    ExecutionMode, FlowDefinition, FlowEngineError, FlowStatus, HttpClient, HttpRequest,
    MemoryBroker, NodeBuilder, NodeStatus, TopicBroker,
};

fn patch(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn callback_flow(timeout: Option<u64>) -> anyhow::Result<FlowDefinition> {
    Ok(DefinitionBuilder::new("callback")
        .start("start", &["callback"])
        .node(
            NodeBuilder::new("callback", "standard")
                .mode(ExecutionMode::HttpCallback)
                .http_callback("https://example.test/hook", timeout)
                .next(&["end"])
                .build(),
        )
        .end("end")
        .build()?)
}

async fn wait_for_status(harness: &Harness, expected: FlowStatus) -> anyhow::Result<()> {
    for _ in 0..100 {
        if harness.flow().await?.overall_status == expected {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("flow never reached {expected:?}")
}

#[tokio::test]
async fn jump_force_completes_running_nodes() -> anyhow::Result<()> {
    let definition = DefinitionBuilder::new("jump")
        .start("start", &["a"])
        .standard("a", &["b"])
        .standard("b", &["end"])
        .end("end")
        .build()?;
    let harness = setup(definition).await?;

    // 模拟在 a 执行期间崩溃：a 停留在 running
    let mut stuck = harness.flow().await?;
    stuck.overall_status = FlowStatus::Running;
    stuck.ensure_state("a").start();
    harness.repository.insert(stuck);

    let flow = harness
        .engine
        .jump_to_node(TENANT, FLOW, "b", Some(patch(json!({"repaired": true}))))
        .await?;

    let a = flow.state("a").unwrap();
    assert_eq!(a.status, NodeStatus::Completed);
    assert!(a.logs.iter().any(|line| line.contains("Force completed due to jump to b")));
    assert_eq!(harness.calls(), vec!["b", "end"]);
    assert_eq!(flow.overall_status, FlowStatus::Completed);

    let ctx = harness.engine.get_flow_context(TENANT, FLOW).await?.unwrap();
    assert_eq!(ctx.get("repaired"), Some(&json!(true)));

    let err = harness
        .engine
        .jump_to_node(TENANT, FLOW, "nowhere", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowEngineError::NodeDefinitionNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn reaper_fails_expired_waits() -> anyhow::Result<()> {
    let harness = setup(callback_flow(Some(0))?).await?;

    let flow = harness.engine.run_flow(TENANT, FLOW).await?;
    let callback_id = flow.state("callback").unwrap().correlation_id.clone().unwrap();

    let reaped = harness.engine.reap_expired_waits(TENANT, FLOW).await?;
    assert_eq!(reaped, vec!["callback"]);

    let flow = harness.flow().await?;
    let state = flow.state("callback").unwrap();
    assert_eq!(state.status, NodeStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("wait timed out"));
    assert_eq!(flow.overall_status, FlowStatus::Failed);

    assert!(!harness
        .engine
        .handle_http_callback(&callback_id, json!({}))
        .await?);
    assert!(harness.engine.reap_expired_waits(TENANT, FLOW).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reaper_leaves_live_waits_alone() -> anyhow::Result<()> {
    let harness = setup(callback_flow(Some(600))?).await?;
    harness.engine.run_flow(TENANT, FLOW).await?;

    assert_eq!(harness.engine.reap_all().await?, 0);
    let flow = harness.flow().await?;
    assert_eq!(status(&flow, "callback"), Some(NodeStatus::Waiting));
    assert_eq!(flow.overall_status, FlowStatus::Running);
    Ok(())
}

#[tokio::test]
async fn spawned_reaper_times_out_running_flows() -> anyhow::Result<()> {
    let harness = setup(callback_flow(Some(0))?).await?;
    harness.engine.run_flow(TENANT, FLOW).await?;

    let reaper = spawn_reaper(harness.engine.clone(), Duration::from_millis(10));
    wait_for_status(&harness, FlowStatus::Failed).await?;
    reaper.abort();
    Ok(())
}

#[tokio::test]
async fn fail_node_marks_flow_failed() -> anyhow::Result<()> {
    let definition = DefinitionBuilder::new("external")
        .start("start", &["worker"])
        .node(
            NodeBuilder::new("worker", "standard")
                .mode(ExecutionMode::External)
                .build(),
        )
        .build()?;
    let harness = setup(definition).await?;
    harness.engine.run_flow(TENANT, FLOW).await?;

    let flow = harness
        .engine
        .fail_node(TENANT, FLOW, "worker", "worker crashed")
        .await?;

    let state = flow.state("worker").unwrap();
    assert_eq!(state.status, NodeStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("worker crashed"));
    assert_eq!(flow.overall_status, FlowStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn stopped_flow_ignores_complete_node() -> anyhow::Result<()> {
    let harness = setup(callback_flow(None)?).await?;
    harness.engine.run_flow(TENANT, FLOW).await?;
    harness.engine.stop_flow(TENANT, FLOW).await?;

    let flow = harness
        .engine
        .complete_node(TENANT, FLOW, "callback", json!({"late": true}))
        .await?;

    assert_eq!(flow.overall_status, FlowStatus::Stopped);
    assert_eq!(status(&flow, "callback"), Some(NodeStatus::Waiting));
    assert!(harness.calls().iter().all(|call| call != "end"));
    Ok(())
}

#[tokio::test]
async fn context_operations_merge_and_reset() -> anyhow::Result<()> {
    let harness = setup(callback_flow(None)?).await?;

    assert!(harness.engine.get_flow_context(TENANT, FLOW).await?.is_none());

    harness
        .engine
        .update_flow_context(TENANT, FLOW, patch(json!({"a": 1, "b": {"x": 1}})))
        .await?;
    let ctx = harness
        .engine
        .update_flow_context(TENANT, FLOW, patch(json!({"b": {"y": 2}, "c": 3})))
        .await?;
    // 浅合并：顶层键整体替换
    assert_eq!(ctx.get("a"), Some(&json!(1)));
    assert_eq!(ctx.get("b"), Some(&json!({"y": 2})));
    assert_eq!(ctx.get("c"), Some(&json!(3)));

    let ctx = harness.engine.init_flow_context(TENANT, FLOW).await?;
    assert!(ctx.data.is_empty());
    let stored = harness.engine.get_flow_context(TENANT, FLOW).await?.unwrap();
    assert!(stored.data.is_empty());
    Ok(())
}

struct RecordingHttpClient {
    requests: Mutex<Vec<HttpRequest>>,
    fail: bool,
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn send(&self, request: HttpRequest) -> flowengine::Result<Value> {
        self.requests.lock().push(request);
        if self.fail {
            return Err(FlowEngineError::HttpCall("status 503".to_string()));
        }
        Ok(json!({"score": 0.9}))
    }
}

fn http_flow() -> anyhow::Result<FlowDefinition> {
    Ok(DefinitionBuilder::new("http")
        .start("start", &["lookup"])
        .node(
            NodeBuilder::new("lookup", "http")
                .http_entry("https://api.example.test/score", "POST")
                .input(json!({"customer": 42}))
                .next(&["end"])
                .build(),
        )
        .end("end")
        .build()?)
}

#[tokio::test]
async fn http_node_posts_input_and_records_response() -> anyhow::Result<()> {
    let harness = setup(http_flow()?).await?;
    let client = Arc::new(RecordingHttpClient {
        requests: Mutex::new(Vec::new()),
        fail: false,
    });
    let engine = harness.engine.clone().with_http_client(client.clone());

    let flow = engine.run_flow(TENANT, FLOW).await?;

    assert_eq!(flow.overall_status, FlowStatus::Completed);
    assert_eq!(flow.state("lookup").unwrap().result, Some(json!({"score": 0.9})));
    let requests = client.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "post");
    assert_eq!(requests[0].url, "https://api.example.test/score");
    assert_eq!(
        requests[0].body,
        Some(json!({"input": {"customer": 42}, "tenantId": TENANT, "flowId": FLOW}))
    );
    Ok(())
}

#[tokio::test]
async fn http_node_failure_fails_the_node() -> anyhow::Result<()> {
    let harness = setup(http_flow()?).await?;

    let err = harness.engine.run_flow(TENANT, FLOW).await.unwrap_err();
    assert!(matches!(err, FlowEngineError::HttpClientMissing(_)));

    let engine = harness.engine.clone().with_http_client(Arc::new(RecordingHttpClient {
        requests: Mutex::new(Vec::new()),
        fail: true,
    }));
    let err = engine.run_flow(TENANT, FLOW).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP call failed: status 503");

    let flow = harness.flow().await?;
    assert_eq!(status(&flow, "lookup"), Some(NodeStatus::Failed));
    assert_eq!(flow.overall_status, FlowStatus::Failed);
    Ok(())
}

fn message_flow() -> anyhow::Result<FlowDefinition> {
    Ok(DefinitionBuilder::new("message")
        .start("start", &["await_reading"])
        .node(
            NodeBuilder::new("await_reading", "standard")
                .mode(ExecutionMode::Message)
                .message("meters/reading", None)
                .next(&["end"])
                .build(),
        )
        .end("end")
        .build()?)
}

#[tokio::test]
async fn message_listener_drives_broker_messages() -> anyhow::Result<()> {
    let harness = setup(message_flow()?).await?;
    let listener = spawn_message_listener(harness.engine.clone(), harness.broker.clone());

    harness.engine.run_flow(TENANT, FLOW).await?;
    harness
        .broker
        .publish("meters/reading", json!({"kwh": 12}))
        .await?;

    wait_for_status(&harness, FlowStatus::Completed).await?;
    let flow = harness.flow().await?;
    assert_eq!(
        flow.state("await_reading").unwrap().result,
        Some(json!({"kwh": 12}))
    );
    listener.abort();
    Ok(())
}

#[tokio::test]
async fn event_listener_drives_bus_events() -> anyhow::Result<()> {
    let definition = DefinitionBuilder::new("event")
        .start("start", &["signal"])
        .node(
            NodeBuilder::new("signal", "standard")
                .mode(ExecutionMode::Event)
                .event("shipment.delivered", None)
                .next(&["end"])
                .build(),
        )
        .end("end")
        .build()?;
    let harness = setup(definition).await?;
    let bus = EventBus::new(16);
    let listener = spawn_event_listener(harness.engine.clone(), &bus);

    harness.engine.run_flow(TENANT, FLOW).await?;
    assert_eq!(bus.emit("shipment.delivered", json!({"parcel": "p-1"})), 1);

    wait_for_status(&harness, FlowStatus::Completed).await?;
    listener.abort();
    Ok(())
}

#[tokio::test]
async fn subscriptions_are_restored_on_a_fresh_broker() -> anyhow::Result<()> {
    let harness = setup(message_flow()?).await?;
    harness.engine.run_flow(TENANT, FLOW).await?;

    let fresh = Arc::new(MemoryBroker::new());
    let restarted = harness.engine.clone().with_broker(fresh.clone());

    assert_eq!(restarted.restore_subscriptions().await?, 1);
    assert_eq!(fresh.subscriptions(), vec!["meters/reading"]);
    Ok(())
}

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use flowengine::{
    action_from_sync_fn, ActionRegistry, EngineConfig, Flow, FlowDefinition, FlowEngine,
    MemoryBroker, MemoryFlowRepository, MemoryStore, MemoryTaskQueue, NodeStatus,
};

pub const TENANT: &str = "tenant1";
pub const FLOW: &str = "flow1";

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct Harness {
    pub engine: FlowEngine,
    pub repository: Arc<MemoryFlowRepository>,
    pub queue: Arc<MemoryTaskQueue>,
    pub broker: Arc<MemoryBroker>,
    pub calls: CallLog,
}

/// 为定义中的每个节点注册一个记录调用顺序的动作，结果为 `{"node": id}`
pub fn recording_actions(definition: &FlowDefinition, calls: &CallLog) -> ActionRegistry {
    let mut actions = ActionRegistry::with_builtins();
    for node in &definition.nodes {
        let calls = Arc::clone(calls);
        let id = node.node_id.clone();
        actions.register_node(
            &node.node_id,
            action_from_sync_fn(move |_input| {
                calls.lock().push(id.clone());
                Ok(json!({ "node": id.clone() }))
            }),
        );
    }
    actions
}

pub async fn setup(definition: FlowDefinition) -> anyhow::Result<Harness> {
    setup_with(definition, EngineConfig::default(), |_| {}).await
}

pub async fn setup_with(
    definition: FlowDefinition,
    config: EngineConfig,
    customize: impl FnOnce(&mut ActionRegistry),
) -> anyhow::Result<Harness> {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut actions = recording_actions(&definition, &calls);
    customize(&mut actions);

    let repository = Arc::new(MemoryFlowRepository::new());
    let queue = Arc::new(MemoryTaskQueue::new());
    let broker = Arc::new(MemoryBroker::new());
    let engine = FlowEngine::new(
        repository.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(actions),
    )
    .with_config(config)
    .with_task_queue(queue.clone())
    .with_broker(broker.clone());

    engine.create_flow(TENANT, FLOW, definition).await?;
    Ok(Harness {
        engine,
        repository,
        queue,
        broker,
        calls,
    })
}

impl Harness {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub async fn flow(&self) -> anyhow::Result<Flow> {
        Ok(self.engine.get_flow(TENANT, FLOW).await?)
    }
}

pub fn status(flow: &Flow, node_id: &str) -> Option<NodeStatus> {
    flow.state(node_id).map(|state| state.status)
}

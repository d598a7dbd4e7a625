use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::action::ActionResolver;
use crate::bridge::{HttpClient, MemoryTaskQueue, TaskQueue, TopicBroker};
use crate::config::EngineConfig;
use crate::error::{FlowEngineError, Result};
use crate::flow::constants::input_key;
use crate::flow::conditions::PredicateRegistry;
use crate::flow::nodes::NodeDefinition;
use crate::flow::types::{Flow, FlowDefinition, FlowStatus, NodeState, NodeStatus};
use crate::state::{
    ContextManager, ContextStore, FlowContext, FlowRepository, WaitEntry, WaitKind, WaitRegistry,
};

use super::dispatch::Handler;
use super::lock::FlowLocks;

/// 流程执行引擎
///
/// 所有协作者通过构造函数注入，可以同时存在多个互相隔离的实例。
/// 每个公开入口都会先获取 `(tenantId, flowId)` 粒度的锁，再执行读-改-写。
#[derive(Clone)]
pub struct FlowEngine {
    pub(super) repository: Arc<dyn FlowRepository>,
    pub(super) context: ContextManager,
    pub(super) waits: Arc<WaitRegistry>,
    pub(super) actions: Arc<dyn ActionResolver>,
    pub(super) predicates: Arc<PredicateRegistry>,
    pub(super) broker: Option<Arc<dyn TopicBroker>>,
    pub(super) tasks: Arc<dyn TaskQueue>,
    pub(super) http: Option<Arc<dyn HttpClient>>,
    pub(super) locks: Arc<FlowLocks>,
    pub(super) config: EngineConfig,
}

impl FlowEngine {
    pub fn new(
        repository: Arc<dyn FlowRepository>,
        store: Arc<dyn ContextStore>,
        actions: Arc<dyn ActionResolver>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            repository,
            context: ContextManager::new(Arc::clone(&store), config.context_ttl()),
            waits: Arc::new(WaitRegistry::new(store)),
            actions,
            predicates: Arc::new(PredicateRegistry::new()),
            broker: None,
            tasks: Arc::new(MemoryTaskQueue::new()),
            http: None,
            locks: Arc::new(FlowLocks::new()),
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.context = ContextManager::new(self.context.store(), config.context_ttl());
        self.config = config;
        self
    }

    pub fn with_predicates(mut self, predicates: Arc<PredicateRegistry>) -> Self {
        self.predicates = predicates;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn TopicBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_task_queue(mut self, tasks: Arc<dyn TaskQueue>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn FlowRepository> {
        Arc::clone(&self.repository)
    }

    pub fn waits(&self) -> Arc<WaitRegistry> {
        Arc::clone(&self.waits)
    }

    pub fn predicates(&self) -> Arc<PredicateRegistry> {
        Arc::clone(&self.predicates)
    }

    pub fn broker(&self) -> Option<Arc<dyn TopicBroker>> {
        self.broker.clone()
    }

    /// 校验定义并保存一个 draft 状态的流程
    pub async fn create_flow(
        &self,
        tenant_id: &str,
        flow_id: &str,
        definition: FlowDefinition,
    ) -> Result<Flow> {
        definition.validate()?;
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = match self.repository.get_flow(tenant_id, flow_id).await? {
            Some(mut existing) => {
                existing.definition = definition;
                existing.node_states.clear();
                existing.overall_status = FlowStatus::Draft;
                existing
            }
            None => Flow::new(tenant_id, flow_id, definition),
        };
        self.persist(&mut flow).await?;
        Ok(flow)
    }

    pub async fn get_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Flow> {
        self.load(tenant_id, flow_id).await
    }

    /// 启动流程：初始化上下文，仅为 start 节点生成 pending 状态，然后从 start 开始执行
    pub async fn run_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Flow> {
        self.run_flow_with(tenant_id, flow_id, Map::new()).await
    }

    #[instrument(skip_all, fields(tenant = %tenant_id, flow = %flow_id))]
    pub async fn run_flow_with(
        &self,
        tenant_id: &str,
        flow_id: &str,
        initial: Map<String, Value>,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        flow.definition.validate()?;
        let start = flow
            .definition
            .start_node()
            .map(|node| node.node_id.clone())
            .ok_or_else(|| FlowEngineError::NoStartNode {
                flow: flow_id.to_string(),
            })?;

        self.context.init(tenant_id, flow_id, initial).await?;
        flow.node_states.clear();
        flow.node_states
            .insert(start.clone(), NodeState::new(start.as_str()));
        flow.overall_status = FlowStatus::Running;
        self.persist(&mut flow).await?;
        info!(start = %start, "flow started");

        self.drive(&mut flow, vec![start]).await?;
        self.finish(&mut flow).await?;
        Ok(flow)
    }

    /// 在调用方已持有的流程上执行节点并推进后继（调用方负责串行化）
    pub async fn execute_node(&self, flow: &mut Flow, node_id: &str) -> Result<()> {
        self.drive(flow, vec![node_id.to_string()]).await?;
        flow.refresh_status();
        Ok(())
    }

    /// 通用外部完成：无论执行模式，标记完成、写入结果并推进 `nextNodes`
    #[instrument(skip_all, fields(tenant = %tenant_id, flow = %flow_id, node = %node_id))]
    pub async fn complete_node(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        result: Value,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.is_stopped() {
            info!("flow stopped, completion ignored");
            return Ok(flow);
        }
        let node = self.node_def(&flow, node_id)?;
        self.record_result(&mut flow, &node, result, "Node externally completed")
            .await?;
        self.persist(&mut flow).await?;

        self.drive(&mut flow, node.next_nodes.clone()).await?;
        self.finish(&mut flow).await?;
        Ok(flow)
    }

    /// 外部 worker 报告失败：节点与流程都标记为 failed
    pub async fn fail_node(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        error: &str,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        self.node_def(&flow, node_id)?;
        flow.ensure_state(node_id).fail(error);
        if !flow.is_stopped() {
            flow.overall_status = FlowStatus::Failed;
        }
        self.persist(&mut flow).await?;
        warn!(tenant = tenant_id, flow = flow_id, node = node_id, error, "node failed externally");
        Ok(flow)
    }

    /// 停止流程；之后的恢复调用都是空操作
    pub async fn stop_flow(&self, tenant_id: &str, flow_id: &str) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        flow.overall_status = FlowStatus::Stopped;
        self.persist(&mut flow).await?;
        info!(tenant = tenant_id, flow = flow_id, "flow stopped");
        Ok(flow)
    }

    /// 管理员跳转：合并上下文，强制完成所有 running 节点，然后从目标节点开始执行。
    /// 不校验跳转是否符合定义中的边。
    #[instrument(skip_all, fields(tenant = %tenant_id, flow = %flow_id, jump_target = %target))]
    pub async fn jump_to_node(
        &self,
        tenant_id: &str,
        flow_id: &str,
        target: &str,
        context: Option<Map<String, Value>>,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.node_def(target).is_none() {
            return Err(FlowEngineError::NodeDefinitionNotFound(format!(
                "Target node not found: {target}"
            )));
        }
        if let Some(context) = context {
            self.context.update(tenant_id, flow_id, context).await?;
        }

        for state in flow.node_states.values_mut() {
            if state.status == NodeStatus::Running {
                state.log(format!("Force completed due to jump to {target}"));
                state.complete(None);
                info!(node = %state.node_id, "running node force completed");
            }
        }
        let state = flow.ensure_state(target);
        if state.status != NodeStatus::Pending {
            state.status = NodeStatus::Pending;
            state.error = None;
        }
        state.log("Jump target");
        flow.overall_status = FlowStatus::Running;
        self.persist(&mut flow).await?;

        self.drive(&mut flow, vec![target.to_string()]).await?;
        self.finish(&mut flow).await?;
        Ok(flow)
    }

    /// 人工推进：选择必须属于 `manualNextNodes`，否则状态保持不变
    #[instrument(skip_all, fields(tenant = %tenant_id, flow = %flow_id, node = %node_id))]
    pub async fn progress_manual_node(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        selected: &str,
        user_input: Option<Value>,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.is_stopped() {
            return Ok(flow);
        }
        let node = self.node_def(&flow, node_id)?;
        expect_status(&flow, node_id, NodeStatus::ManualWait)?;
        if !node.manual_next_nodes.iter().any(|n| n == selected) {
            return Err(FlowEngineError::InvalidSelection {
                node: node_id.to_string(),
                selection: selected.to_string(),
            });
        }

        if let Some(input) = user_input {
            self.context
                .set_value(tenant_id, flow_id, input_key(node_id), input)
                .await?;
        }
        let state = flow.ensure_state(node_id);
        state.selected_next = Some(selected.to_string());
        state.complete(None);
        state.log(format!("Manually progressed to {selected}"));
        self.persist(&mut flow).await?;

        self.drive(&mut flow, vec![selected.to_string()]).await?;
        self.finish(&mut flow).await?;
        Ok(flow)
    }

    /// 提供等待中的输入：校验必填字段，写入 `{nodeId}_input`，再按 auto 方式执行节点
    #[instrument(skip_all, fields(tenant = %tenant_id, flow = %flow_id, node = %node_id))]
    pub async fn resume_with_input(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        input: Value,
    ) -> Result<Flow> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.is_stopped() {
            return Ok(flow);
        }
        let node = self.node_def(&flow, node_id)?;
        expect_status(&flow, node_id, NodeStatus::Waiting)?;

        let missing: Vec<String> = node
            .input_requirements()
            .into_iter()
            .filter(|field| input.get(field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(FlowEngineError::MissingInput {
                node: node_id.to_string(),
                fields: missing,
            });
        }

        self.context
            .set_value(tenant_id, flow_id, input_key(node_id), input)
            .await?;
        flow.ensure_state(node_id).log("Input received");

        let next = self.step_with(&mut flow, &node, Handler::Auto).await?;
        self.drive(&mut flow, next).await?;
        self.finish(&mut flow).await?;
        Ok(flow)
    }

    /// 投递 HTTP 回调；条目不存在（已消费或过期）时为空操作并返回 false
    pub async fn handle_http_callback(&self, callback_id: &str, data: Value) -> Result<bool> {
        self.resume_snapshot(WaitKind::HttpCallback, callback_id, data)
            .await
    }

    /// 投递 topic 消息，恢复该 topic 上所有等待的节点，返回恢复数量
    pub async fn handle_message(&self, topic: &str, payload: Value) -> Result<usize> {
        self.resume_named(WaitKind::Message, topic, payload).await
    }

    /// 触发自定义事件，恢复所有等待该事件的节点，返回恢复数量
    pub async fn emit_event(&self, event_name: &str, data: Value) -> Result<usize> {
        self.resume_named(WaitKind::Event, event_name, data).await
    }

    /// httpListener 节点的回调；没有等待标记时为空操作
    pub async fn handle_http_listener(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        payload: Value,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        if !self.waits.take_listener(tenant_id, flow_id, node_id).await? {
            debug!(tenant = tenant_id, flow = flow_id, node = node_id, "no http listener waiting");
            return Ok(false);
        }
        match self
            .complete_waiting(tenant_id, flow_id, node_id, payload, "Node resumed by HTTP listener")
            .await
        {
            Ok(resumed) => Ok(resumed),
            Err(err) => {
                let ttl = self.config.http_listener_ttl();
                if let Err(restore) = self
                    .waits
                    .mark_listener(tenant_id, flow_id, node_id, ttl)
                    .await
                {
                    error!(error = %restore, "failed to restore http listener flag");
                }
                Err(err)
            }
        }
    }

    /// 外部任务完成（仅携带 flowId）；节点不在 waiting 时为空操作
    pub async fn handle_external_completion(
        &self,
        flow_id: &str,
        node_id: &str,
        result: Value,
    ) -> Result<bool> {
        let Some(flow) = self.repository.find_by_flow_id(flow_id).await? else {
            warn!(flow = flow_id, node = node_id, "external completion for unknown flow");
            return Ok(false);
        };
        let tenant_id = flow.tenant_id;
        let _guard = self.locks.acquire(&tenant_id, flow_id).await;
        self.complete_waiting(&tenant_id, flow_id, node_id, result, "Node completed by external worker")
            .await
    }

    /// 超时回收：截止时间已过的等待节点标记为 failed，流程标记为 failed，返回被回收的节点
    pub async fn reap_expired_waits(&self, tenant_id: &str, flow_id: &str) -> Result<Vec<String>> {
        let _guard = self.locks.acquire(tenant_id, flow_id).await;
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.is_stopped() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let expired: Vec<String> = flow
            .node_states
            .values()
            .filter(|state| {
                matches!(state.status, NodeStatus::Waiting | NodeStatus::ManualWait)
                    && state.wait_deadline.is_some_and(|deadline| deadline <= now)
            })
            .map(|state| state.node_id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(expired);
        }

        for node_id in &expired {
            self.discard_wait(&flow, node_id).await?;
            let state = flow.ensure_state(node_id);
            state.wait_deadline = None;
            state.fail("wait timed out");
            warn!(tenant = tenant_id, flow = flow_id, node = %node_id, "waiting node timed out");
        }
        flow.overall_status = FlowStatus::Failed;
        self.persist(&mut flow).await?;
        Ok(expired)
    }

    /// 对仓库中所有 running 流程执行超时回收，返回回收的节点总数
    pub async fn reap_all(&self) -> Result<usize> {
        let mut reaped = 0;
        for flow in self.repository.running_flows().await? {
            match self.reap_expired_waits(&flow.tenant_id, &flow.flow_id).await {
                Ok(nodes) => reaped += nodes.len(),
                Err(err) => {
                    error!(tenant = %flow.tenant_id, flow = %flow.flow_id, error = %err, "reaper failed")
                }
            }
        }
        Ok(reaped)
    }

    /// 重启后恢复 broker 订阅，返回订阅的 topic 数
    pub async fn restore_subscriptions(&self) -> Result<usize> {
        let Some(broker) = &self.broker else {
            return Ok(0);
        };
        let topics = self.waits.topics().await?;
        for topic in &topics {
            broker.subscribe(topic).await?;
        }
        info!(count = topics.len(), "broker subscriptions restored");
        Ok(topics.len())
    }

    pub async fn get_flow_context(
        &self,
        tenant_id: &str,
        flow_id: &str,
    ) -> Result<Option<FlowContext>> {
        self.context.get(tenant_id, flow_id).await
    }

    /// 浅合并更新上下文
    pub async fn update_flow_context(
        &self,
        tenant_id: &str,
        flow_id: &str,
        patch: Map<String, Value>,
    ) -> Result<FlowContext> {
        self.context.update(tenant_id, flow_id, patch).await
    }

    pub async fn init_flow_context(&self, tenant_id: &str, flow_id: &str) -> Result<FlowContext> {
        self.context.init(tenant_id, flow_id, Map::new()).await
    }

    // ---- 内部实现 ----

    async fn load(&self, tenant_id: &str, flow_id: &str) -> Result<Flow> {
        self.repository
            .get_flow(tenant_id, flow_id)
            .await?
            .ok_or_else(|| FlowEngineError::FlowNotFound {
                tenant: tenant_id.to_string(),
                flow: flow_id.to_string(),
            })
    }

    fn node_def(&self, flow: &Flow, node_id: &str) -> Result<NodeDefinition> {
        flow.node_def(node_id)
            .cloned()
            .ok_or_else(|| FlowEngineError::NodeDefinitionNotFound(node_id.to_string()))
    }

    pub(super) async fn persist(&self, flow: &mut Flow) -> Result<()> {
        self.repository.save_flow(flow).await
    }

    async fn finish(&self, flow: &mut Flow) -> Result<()> {
        flow.refresh_status();
        self.persist(flow).await?;
        debug!(flow = %flow.flow_id, status = ?flow.overall_status, "drive finished");
        Ok(())
    }

    /// 深度优先的迭代工作表，后继按声明顺序依次执行
    async fn drive(&self, flow: &mut Flow, start: Vec<String>) -> Result<()> {
        let mut stack: Vec<String> = start.into_iter().rev().collect();
        let mut steps = 0u32;
        while let Some(node_id) = stack.pop() {
            if flow.is_stopped() {
                info!(flow = %flow.flow_id, "flow stopped, dispatch halted");
                break;
            }
            steps += 1;
            if steps > self.config.max_steps {
                return Err(FlowEngineError::StepLimitExceeded(self.config.max_steps));
            }
            let next = self.step(flow, &node_id).await?;
            stack.extend(next.into_iter().rev());
        }
        Ok(())
    }

    async fn step(&self, flow: &mut Flow, node_id: &str) -> Result<Vec<String>> {
        let node = self.node_def(flow, node_id)?;
        self.step_with(flow, &node, Handler::resolve(&node)).await
    }

    /// 执行单个节点：成功后持久化；失败时节点标记为 failed、持久化并返回原始错误
    async fn step_with(
        &self,
        flow: &mut Flow,
        node: &NodeDefinition,
        handler: Handler,
    ) -> Result<Vec<String>> {
        flow.ensure_state(&node.node_id);
        debug!(
            flow = %flow.flow_id,
            node = %node.node_id,
            handler = handler.as_str(),
            "executing node"
        );
        match self.run_handler(handler, flow, node).await {
            Ok(next) => {
                self.persist(flow).await?;
                Ok(next)
            }
            Err(err) => {
                error!(flow = %flow.flow_id, node = %node.node_id, error = %err, "node failed");
                flow.ensure_state(&node.node_id).fail(err.to_string());
                flow.refresh_status();
                if let Err(persist_err) = self.persist(flow).await {
                    error!(error = %persist_err, "failed to persist node failure");
                }
                Err(err)
            }
        }
    }

    /// 仅当节点处于 waiting 时完成并推进（调用方持有锁）
    async fn complete_waiting(
        &self,
        tenant_id: &str,
        flow_id: &str,
        node_id: &str,
        result: Value,
        message: &str,
    ) -> Result<bool> {
        let mut flow = self.load(tenant_id, flow_id).await?;
        if flow.is_stopped() {
            return Ok(false);
        }
        let node = self.node_def(&flow, node_id)?;
        if flow.state(node_id).map(|s| s.status) != Some(NodeStatus::Waiting) {
            debug!(tenant = tenant_id, flow = flow_id, node = node_id, "node not waiting, ignored");
            return Ok(false);
        }
        self.record_result(&mut flow, &node, result, message).await?;
        self.persist(&mut flow).await?;
        info!(tenant = tenant_id, flow = flow_id, node = node_id, "{message}");

        self.drive(&mut flow, node.next_nodes.clone()).await?;
        self.finish(&mut flow).await?;
        Ok(true)
    }

    async fn resume_named(&self, kind: WaitKind, name: &str, payload: Value) -> Result<usize> {
        let mut resumed = 0;
        for correlation_id in self.waits.waiting_on(kind, name).await? {
            match self
                .resume_snapshot(kind, &correlation_id, payload.clone())
                .await
            {
                Ok(done) => {
                    if done {
                        resumed += 1;
                    }
                    self.waits.index_remove(kind, name, &correlation_id).await?;
                }
                Err(err) => {
                    error!(name, correlation_id = %correlation_id, error = %err, "resume failed");
                }
            }
        }
        if resumed == 0 {
            debug!(name, kind = kind.prefix(), "no waiting nodes resumed");
        }
        Ok(resumed)
    }

    /// 快照恢复：认领条目（只会成功一次），用最新的流程完成节点并推进后继。
    /// 完成结果无法持久化时把条目放回，以便重投。
    async fn resume_snapshot(
        &self,
        kind: WaitKind,
        correlation_id: &str,
        payload: Value,
    ) -> Result<bool> {
        let Some(peeked) = self.waits.peek(kind, correlation_id).await? else {
            debug!(kind = kind.prefix(), correlation_id, "wait entry absent, resume ignored");
            return Ok(false);
        };
        let tenant_id = peeked.flow.tenant_id.clone();
        let flow_id = peeked.flow.flow_id.clone();
        let _guard = self.locks.acquire(&tenant_id, &flow_id).await;

        let Some(entry) = self.waits.take(kind, correlation_id).await? else {
            debug!(kind = kind.prefix(), correlation_id, "wait entry already consumed");
            return Ok(false);
        };
        let mut flow = match self.repository.get_flow(&tenant_id, &flow_id).await? {
            Some(flow) => flow,
            None => entry.flow.clone(),
        };
        if flow.is_stopped() {
            info!(tenant = %tenant_id, flow = %flow_id, "flow stopped, resume ignored");
            return Ok(false);
        }

        let node = entry.node_def.clone();
        flow.node_states
            .entry(node.node_id.clone())
            .or_insert_with(|| entry.node_state.clone());

        let completed = async {
            let message = format!("Node resumed by {}", kind.prefix());
            self.record_result(&mut flow, &node, payload, &message).await?;
            self.persist(&mut flow).await
        }
        .await;
        if let Err(err) = completed {
            self.restore_entry(kind, correlation_id, &entry).await;
            return Err(err);
        }
        info!(
            tenant = %tenant_id,
            flow = %flow_id,
            node = %node.node_id,
            correlation_id,
            "waiting node resumed"
        );

        self.drive(&mut flow, node.next_nodes.clone()).await?;
        self.finish(&mut flow).await?;
        Ok(true)
    }

    async fn restore_entry(&self, kind: WaitKind, correlation_id: &str, entry: &WaitEntry) {
        let ttl = self.config.wait_ttl(wait_timeout(&entry.node_def, kind));
        if let Err(err) = self.waits.put(kind, correlation_id, entry, ttl).await {
            error!(correlation_id, error = %err, "failed to restore wait entry");
        }
    }

    /// 删除节点残留的等待条目与索引
    async fn discard_wait(&self, flow: &Flow, node_id: &str) -> Result<()> {
        let Some(node) = flow.node_def(node_id) else {
            return Ok(());
        };
        let correlation_id = flow.state(node_id).and_then(|s| s.correlation_id.clone());
        match (Handler::resolve(node), correlation_id) {
            (Handler::Message, Some(id)) => {
                self.waits.remove(WaitKind::Message, &id).await?;
                if let Some(config) = &node.message {
                    self.waits
                        .index_remove(WaitKind::Message, &config.topic, &id)
                        .await?;
                }
            }
            (Handler::Event, Some(id)) => {
                self.waits.remove(WaitKind::Event, &id).await?;
                if let Some(config) = &node.event {
                    self.waits
                        .index_remove(WaitKind::Event, &config.event_name, &id)
                        .await?;
                }
            }
            (Handler::HttpCallback, Some(id)) => {
                self.waits.remove(WaitKind::HttpCallback, &id).await?;
            }
            (Handler::HttpListener, _) => {
                self.waits
                    .clear_listener(&flow.tenant_id, &flow.flow_id, node_id)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn expect_status(flow: &Flow, node_id: &str, expected: NodeStatus) -> Result<()> {
    match flow.state(node_id).map(|state| state.status) {
        Some(status) if status == expected => Ok(()),
        status => Err(FlowEngineError::NodeNotAwaiting {
            node: node_id.to_string(),
            status: status.map_or("none", |s| s.as_str()).to_string(),
        }),
    }
}

fn wait_timeout(node: &NodeDefinition, kind: WaitKind) -> Option<u64> {
    match kind {
        WaitKind::Message => node.message.as_ref().and_then(|c| c.timeout),
        WaitKind::HttpCallback => node.http.as_ref().and_then(|c| c.timeout),
        WaitKind::Event => node.event.as_ref().and_then(|c| c.timeout),
    }
}

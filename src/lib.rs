pub mod action;
pub mod bridge;
pub mod config;
pub mod error;
pub mod flow;
pub mod runtime;
pub mod state;
pub mod utils;

pub use action::{
    action_from_fn, action_from_sync_fn, ActionRegistry, ActionResolver, NodeAction, PassThrough,
};
pub use bridge::{
    BrokerMessage, EventBus, FlowEvent, HttpClient, HttpRequest, MemoryBroker, MemoryTaskQueue,
    TaskQueue, TopicBroker,
};
pub use config::{EngineConfig, EnvConfig};
pub use error::{FlowEngineError, Result};
pub use flow::{
    load_definition_from_path, load_definition_from_str, load_definition_from_value, Branch,
    DecisionCondition, DefinitionBuilder, ExecutionMode, Flow, FlowDefinition, FlowStatus,
    NodeBuilder, NodeDefinition, NodeState, NodeStatus, Predicate, PredicateRegistry, Rule,
};
pub use runtime::{
    spawn_event_listener, spawn_message_listener, spawn_reaper, ExternalTask, FlowEngine,
    PythonTask,
};
pub use state::{
    ContextManager, ContextStore, FlowContext, FlowRepository, MemoryFlowRepository, MemoryStore,
    WaitKind, WaitRegistry,
};
pub use utils::logging;

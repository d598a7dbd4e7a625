// Flow 模块 - 流程定义、节点与条件

pub mod builder;
pub mod conditions;
pub mod constants;
pub mod expression;
pub mod loader;
pub mod nodes;
pub mod types;

// 重新导出核心类型
pub use builder::{DefinitionBuilder, NodeBuilder};
pub use conditions::{predicate_from_fn, Predicate, PredicateFn, PredicateRegistry, Rule};
pub use loader::{load_definition_from_path, load_definition_from_str, load_definition_from_value};
pub use nodes::{
    Branch, DecisionCondition, EventConfig, ExecutionMode, HttpCallbackConfig, HttpEntry,
    MessageConfig, NodeDefinition,
};
pub use types::{Flow, FlowDefinition, FlowEdge, FlowStatus, NodeState, NodeStatus};

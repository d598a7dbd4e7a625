use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowEngineError>;

#[derive(Debug, Error)]
pub enum FlowEngineError {
    #[error("flow not found: tenant={tenant}, flowId={flow}")]
    FlowNotFound { tenant: String, flow: String },
    #[error("flow `{flow}` has no start node")]
    NoStartNode { flow: String },
    #[error("node definition not found: {0}")]
    NodeDefinitionNotFound(String),
    #[error("node action not found: {node} -> {node_type}")]
    ActionNotFound { node: String, node_type: String },
    #[error("node `{node}` references unknown node `{target}`")]
    InvalidReference { node: String, target: String },
    #[error("duplicate node id `{0}` in flow definition")]
    DuplicateNode(String),
    #[error("invalid configuration for node `{node}`: {reason}")]
    InvalidNodeConfiguration { node: String, reason: String },
    #[error("Invalid next node selection: {selection}")]
    InvalidSelection { node: String, selection: String },
    #[error("node `{node}` is not awaiting input (status `{status}`)")]
    NodeNotAwaiting { node: String, status: String },
    #[error("node `{node}` is missing required input fields: {}", fields.join(", "))]
    MissingInput { node: String, fields: Vec<String> },
    #[error("expression error: {0}")]
    Expression(String),
    #[error("predicate function `{0}` not registered")]
    UnknownPredicate(String),
    #[error("{0}")]
    HttpCall(String),
    #[error("no http client configured for node `{0}`")]
    HttpClientMissing(String),
    #[error("maximum dispatch steps {0} exceeded")]
    StepLimitExceeded(u32),
    #[error("flow `{tenant}:{flow}` was modified concurrently")]
    VersionConflict { tenant: String, flow: String },
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 流程相关的常量定义
///
/// 统一管理节点类型、上下文键等字符串常量

/// 节点类型常量（`type` 字段）
pub mod node_types {
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const DECISION: &str = "decision";
    pub const SWITCH: &str = "switch";
    pub const HTTP: &str = "http";
    pub const HTTP_LISTENER: &str = "httpListener";
    pub const PYTHON: &str = "python";
    pub const STANDARD: &str = "standard";
}

/// 节点输入字段
pub mod fields {
    pub const CONTEXT: &str = "context";
    pub const INPUT: &str = "input";
    pub const REQUIREMENTS: &str = "requirements";
}

/// 默认值
pub mod defaults {
    /// 上下文 TTL（秒）
    pub const CONTEXT_TTL_SECS: u64 = 86_400;
    /// 等待节点默认超时（秒）
    pub const WAIT_TIMEOUT_SECS: u64 = 3_600;
    /// httpListener 等待标记 TTL（秒）
    pub const HTTP_LISTENER_TTL_SECS: u64 = 86_400;
    /// 单次驱动的最大节点步数
    pub const MAX_STEPS: u32 = 10_000;
    pub const EXTERNAL_QUEUE: &str = "external_tasks";
    pub const PYTHON_QUEUE_PREFIX: &str = "pythonQueue";
    pub const REAPER_INTERVAL_SECS: u64 = 60;
}

/// `{nodeId}_result`
pub fn result_key(node_id: &str) -> String {
    format!("{node_id}_result")
}

/// `{nodeId}_input`
pub fn input_key(node_id: &str) -> String {
    format!("{node_id}_input")
}

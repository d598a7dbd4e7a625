use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

/// 日志配置
pub struct LoggingConfig;

impl LoggingConfig {
    /// 初始化日志系统
    ///
    /// 支持通过环境变量配置：
    /// - RUST_LOG: 设置日志级别（优先）
    /// - FLOWENGINE_DEBUG: 启用详细调试输出（文件、行号、线程 ID）
    ///
    /// 重复调用不会 panic，第二次起静默忽略。
    ///
    /// ```no_run
    /// use flowengine::utils::LoggingConfig;
    ///
    /// LoggingConfig::init();
    /// tracing::info!("engine ready");
    /// ```
    pub fn init() {
        let is_debug = Self::is_debug();

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(Self::default_filter(is_debug)));

        let fmt_layer = fmt::layer()
            .with_target(is_debug)
            .with_file(is_debug)
            .with_line_number(is_debug)
            .with_thread_ids(is_debug);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed && is_debug {
            tracing::debug!("debug logging enabled");
        }
    }

    /// 初始化日志系统（带自定义过滤器）
    pub fn init_with_filter(filter: &str) {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(fmt::layer())
            .try_init();
    }

    pub fn is_debug() -> bool {
        EnvConfig::is_debug_mode()
    }

    fn default_filter(is_debug: bool) -> &'static str {
        if is_debug {
            "flowengine=debug,info"
        } else {
            "flowengine=info,warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_follows_debug_flag() {
        assert_eq!(LoggingConfig::default_filter(true), "flowengine=debug,info");
        assert_eq!(LoggingConfig::default_filter(false), "flowengine=info,warn");
    }
}

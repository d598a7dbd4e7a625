use std::env;
use std::str::FromStr;

use anyhow::anyhow;

use crate::error::{FlowEngineError, Result};
use super::engine::EngineConfig;

pub const CONTEXT_TTL_VAR: &str = "FLOWENGINE_CONTEXT_TTL";
pub const WAIT_TIMEOUT_VAR: &str = "FLOWENGINE_WAIT_TIMEOUT";
pub const MAX_STEPS_VAR: &str = "FLOWENGINE_MAX_STEPS";
pub const REDIS_URL_VAR: &str = "FLOWENGINE_REDIS_URL";
pub const DEBUG_VAR: &str = "FLOWENGINE_DEBUG";

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| {
            FlowEngineError::Other(anyhow!("environment variable '{}' is not set", key))
        })
    }

    /// 获取可选的环境变量
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// 解析可选的数值变量；存在但无法解析时报错
    pub fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>> {
        match Self::get_env_optional(key) {
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                FlowEngineError::Other(anyhow!("environment variable '{}' has invalid value '{}'", key, raw))
            }),
            None => Ok(None),
        }
    }

    /// 检查是否启用调试模式
    pub fn is_debug_mode() -> bool {
        env::var(DEBUG_VAR).is_ok()
    }

    pub fn redis_url() -> Option<String> {
        Self::get_env_optional(REDIS_URL_VAR)
    }

    /// 用环境变量覆盖配置
    pub fn apply(mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(ttl) = Self::parse_optional(CONTEXT_TTL_VAR)? {
            config.context_ttl_secs = ttl;
        }
        if let Some(timeout) = Self::parse_optional(WAIT_TIMEOUT_VAR)? {
            config.default_wait_timeout_secs = timeout;
        }
        if let Some(steps) = Self::parse_optional(MAX_STEPS_VAR)? {
            config.max_steps = steps;
        }
        Ok(config)
    }

    pub fn engine_config() -> Result<EngineConfig> {
        Self::apply(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        env::set_var(MAX_STEPS_VAR, "42");
        env::set_var(WAIT_TIMEOUT_VAR, "10");
        let config = EnvConfig::engine_config().unwrap();
        assert_eq!(config.max_steps, 42);
        assert_eq!(config.default_wait_timeout_secs, 10);

        env::set_var(CONTEXT_TTL_VAR, "soon");
        assert!(EnvConfig::engine_config().is_err());

        env::remove_var(MAX_STEPS_VAR);
        env::remove_var(WAIT_TIMEOUT_VAR);
        env::remove_var(CONTEXT_TTL_VAR);
    }
}

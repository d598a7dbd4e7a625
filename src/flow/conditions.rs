use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowEngineError, Result};
use crate::flow::expression::{self, compare, lookup, split_path, Comparison};

/// 条件（谓词）类型定义
///
/// 定义中的 `condition` 字段可以是：
/// - 布尔字面量：`true` 常用作兜底分支
/// - 表达式字符串：`"context.value > 10"`，由受限解释器求值
/// - 结构化规则：`{"op": "greater_than", "path": "value", "value": 10}`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Literal(bool),
    Expression(String),
    Rule(Rule),
}

/// 结构化规则
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Rule {
    Always,
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    GreaterThan { path: String, value: Value },
    GreaterOrEqual { path: String, value: Value },
    LessThan { path: String, value: Value },
    LessOrEqual { path: String, value: Value },
    Exists { path: String },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
    /// 引用 `PredicateRegistry` 中注册的函数
    Function { name: String },
}

impl Predicate {
    pub fn expression(source: impl Into<String>) -> Self {
        Predicate::Expression(source.into())
    }

    pub fn function(name: impl Into<String>) -> Self {
        Predicate::Rule(Rule::Function { name: name.into() })
    }

    pub fn evaluate(&self, ctx: &Value, registry: &PredicateRegistry) -> Result<bool> {
        match self {
            Predicate::Literal(value) => Ok(*value),
            Predicate::Expression(source) => expression::evaluate(source, ctx),
            Predicate::Rule(rule) => rule.evaluate(ctx, registry),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Literal(value) => write!(f, "{value}"),
            Predicate::Expression(source) => f.write_str(source),
            Predicate::Rule(rule) => match serde_json::to_string(rule) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{rule:?}"),
            },
        }
    }
}

impl Rule {
    fn evaluate(&self, ctx: &Value, registry: &PredicateRegistry) -> Result<bool> {
        let check = |path: &str, op: Comparison, value: &Value| {
            compare(op, &lookup(ctx, &split_path(path)), value)
        };
        Ok(match self {
            Rule::Always => true,
            Rule::Equals { path, value } => check(path, Comparison::Eq, value),
            Rule::NotEquals { path, value } => check(path, Comparison::Ne, value),
            Rule::GreaterThan { path, value } => check(path, Comparison::Gt, value),
            Rule::GreaterOrEqual { path, value } => check(path, Comparison::Ge, value),
            Rule::LessThan { path, value } => check(path, Comparison::Lt, value),
            Rule::LessOrEqual { path, value } => check(path, Comparison::Le, value),
            Rule::Exists { path } => !lookup(ctx, &split_path(path)).is_null(),
            Rule::And { all } => {
                for predicate in all {
                    if !predicate.evaluate(ctx, registry)? {
                        return Ok(false);
                    }
                }
                true
            }
            Rule::Or { any } => {
                for predicate in any {
                    if predicate.evaluate(ctx, registry)? {
                        return Ok(true);
                    }
                }
                false
            }
            Rule::Not { predicate } => !predicate.evaluate(ctx, registry)?,
            Rule::Function { name } => registry.call(name, ctx)?,
        })
    }
}

/// 评估函数类型
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 从函数创建评估函数
pub fn predicate_from_fn<F>(func: F) -> PredicateFn
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(func)
}

/// 命名评估函数注册表（替代动态代码求值的逃生口）
#[derive(Default)]
pub struct PredicateRegistry {
    functions: RwLock<HashMap<String, PredicateFn>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.functions
            .write()
            .insert(name.into(), predicate_from_fn(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    pub fn call(&self, name: &str, ctx: &Value) -> Result<bool> {
        let func = self
            .functions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FlowEngineError::UnknownPredicate(name.to_string()))?;
        Ok(func(ctx))
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("functions", &self.functions.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn predicates_deserialize_from_all_shapes() {
        let literal: Predicate = serde_json::from_value(json!(true)).unwrap();
        assert!(matches!(literal, Predicate::Literal(true)));

        let expr: Predicate = serde_json::from_value(json!("value > 1")).unwrap();
        assert!(matches!(expr, Predicate::Expression(_)));

        let rule: Predicate = serde_json::from_value(json!({
            "op": "and",
            "all": [
                {"op": "greater_than", "path": "context.value", "value": 10},
                "flag == true"
            ]
        }))
        .unwrap();
        let registry = PredicateRegistry::new();
        assert!(rule
            .evaluate(&json!({"value": 11, "flag": true}), &registry)
            .unwrap());
        assert!(!rule
            .evaluate(&json!({"value": 9, "flag": true}), &registry)
            .unwrap());
    }

    #[test]
    fn function_rules_use_the_registry() {
        let registry = PredicateRegistry::new();
        registry.register("is_vip", |ctx| ctx["tier"] == "vip");

        let predicate = Predicate::function("is_vip");
        assert!(predicate
            .evaluate(&json!({"tier": "vip"}), &registry)
            .unwrap());

        let unknown = Predicate::function("nope");
        assert!(matches!(
            unknown.evaluate(&json!({}), &registry),
            Err(FlowEngineError::UnknownPredicate(_))
        ));
    }
}

//! 受限表达式解释器
//!
//! 仅支持字面量、上下文路径、比较运算和布尔逻辑，不执行任意代码：
//!
//! ```text
//! context.value > 10 && status == 'ok'
//! !(retries >= 3) || force
//! ```
//!
//! 路径可带可选的 `context.` 前缀；缺失路径求值为 `null`。

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{FlowEngineError, Result};

const CONTEXT_ROOT: &str = "context";

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(Op),
    LParen,
    RParen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

/// 已解析的表达式
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Compare(Comparison, Box<Expression>, Box<Expression>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(FlowEngineError::Expression(format!(
                "unexpected token {:?} in `{source}`",
                parser.tokens[parser.pos]
            )));
        }
        Ok(expr)
    }

    pub fn eval(&self, ctx: &Value) -> Value {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Path(segments) => lookup(ctx, segments),
            Expression::Not(inner) => Value::Bool(!truthy(&inner.eval(ctx))),
            Expression::And(lhs, rhs) => {
                Value::Bool(truthy(&lhs.eval(ctx)) && truthy(&rhs.eval(ctx)))
            }
            Expression::Or(lhs, rhs) => {
                Value::Bool(truthy(&lhs.eval(ctx)) || truthy(&rhs.eval(ctx)))
            }
            Expression::Compare(cmp, lhs, rhs) => {
                Value::Bool(compare(*cmp, &lhs.eval(ctx), &rhs.eval(ctx)))
            }
        }
    }

    pub fn test(&self, ctx: &Value) -> bool {
        truthy(&self.eval(ctx))
    }
}

/// 解析并求值，返回布尔结果
pub fn evaluate(source: &str, ctx: &Value) -> Result<bool> {
    Ok(Expression::parse(source)?.test(ctx))
}

/// JS 风格的真值判断
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 按点分路径读取上下文，支持数组下标
pub fn lookup(ctx: &Value, segments: &[String]) -> Value {
    let mut current = ctx;
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// 将 `context.a.b` / `a.b` 拆分为路径段
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if segments.first().map(String::as_str) == Some(CONTEXT_ROOT) {
        segments.remove(0);
    }
    segments
}

pub fn compare(cmp: Comparison, lhs: &Value, rhs: &Value) -> bool {
    match cmp {
        Comparison::Eq => loose_eq(lhs, rhs),
        Comparison::Ne => !loose_eq(lhs, rhs),
        Comparison::StrictEq => strict_eq(lhs, rhs),
        Comparison::StrictNe => !strict_eq(lhs, rhs),
        Comparison::Lt => ordering(lhs, rhs) == Some(Ordering::Less),
        Comparison::Le => matches!(ordering(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
        Comparison::Gt => ordering(lhs, rhs) == Some(Ordering::Greater),
        Comparison::Ge => matches!(
            ordering(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn strict_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            lhs == rhs
        }
        _ => match (as_number(lhs), as_number(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Null, _) | (_, Value::Null) => None,
        _ => match (as_number(lhs), as_number(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                        None => {
                            return Err(FlowEngineError::Expression(format!(
                                "unterminated string in `{source}`"
                            )))
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (op, len) = if rest.starts_with("===") {
                    (Op::StrictEq, 3)
                } else if rest.starts_with("!==") {
                    (Op::StrictNe, 3)
                } else if rest.starts_with("==") {
                    (Op::Eq, 2)
                } else if rest.starts_with("!=") {
                    (Op::Ne, 2)
                } else if rest.starts_with("<=") {
                    (Op::Le, 2)
                } else if rest.starts_with(">=") {
                    (Op::Ge, 2)
                } else if rest.starts_with("&&") {
                    (Op::And, 2)
                } else if rest.starts_with("||") {
                    (Op::Or, 2)
                } else if c == '<' {
                    (Op::Lt, 1)
                } else if c == '>' {
                    (Op::Gt, 1)
                } else if c == '!' {
                    (Op::Not, 1)
                } else {
                    return Err(FlowEngineError::Expression(format!(
                        "unsupported operator `{c}` in `{source}`"
                    )));
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    FlowEngineError::Expression(format!("invalid number `{text}`"))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::Op(Op::And),
                    "or" => Token::Op(Op::Or),
                    "not" => Token::Op(Op::Not),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(FlowEngineError::Expression(format!(
                    "unexpected character `{other}` in `{source}`"
                )))
            }
        }
    }
    Ok(tokens)
}

/// 括号、`!` 的嵌套层数以及同一层 `&&` / `||` 链的长度上限
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(too_deep());
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        let mut chain = 0;
        while self.peek() == Some(&Token::Op(Op::Or)) {
            chain += 1;
            if chain > MAX_DEPTH {
                return Err(too_deep());
            }
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expression::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_comparison()?;
        let mut chain = 0;
        while self.peek() == Some(&Token::Op(Op::And)) {
            chain += 1;
            if chain > MAX_DEPTH {
                return Err(too_deep());
            }
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expression::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_unary()?;
        let cmp = match self.peek() {
            Some(Token::Op(Op::Eq)) => Comparison::Eq,
            Some(Token::Op(Op::Ne)) => Comparison::Ne,
            Some(Token::Op(Op::StrictEq)) => Comparison::StrictEq,
            Some(Token::Op(Op::StrictNe)) => Comparison::StrictNe,
            Some(Token::Op(Op::Lt)) => Comparison::Lt,
            Some(Token::Op(Op::Le)) => Comparison::Le,
            Some(Token::Op(Op::Gt)) => Comparison::Gt,
            Some(Token::Op(Op::Ge)) => Comparison::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_unary()?;
        Ok(Expression::Compare(cmp, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.peek() == Some(&Token::Op(Op::Not)) {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expression::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::Str(s)) => Ok(Expression::Literal(Value::String(s))),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" => Expression::Literal(Value::Bool(true)),
                "false" => Expression::Literal(Value::Bool(false)),
                "null" | "undefined" => Expression::Literal(Value::Null),
                _ => Expression::Path(split_path(&word)),
            }),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FlowEngineError::Expression("missing `)`".to_string())),
                }
            }
            Some(other) => Err(FlowEngineError::Expression(format!(
                "unexpected token {other:?}"
            ))),
            None => Err(FlowEngineError::Expression(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

fn too_deep() -> FlowEngineError {
    FlowEngineError::Expression(format!("expression nested deeper than {MAX_DEPTH}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compares_numbers_with_context_prefix() {
        let ctx = json!({"value": 15});
        assert!(evaluate("context.value > 10", &ctx).unwrap());
        assert!(!evaluate("context.value <= 10", &ctx).unwrap());
        assert!(evaluate("value >= 15", &ctx).unwrap());
    }

    #[test]
    fn boolean_logic_and_precedence() {
        let ctx = json!({"a": 1, "b": 0, "status": "ok"});
        assert!(evaluate("a == 1 && status == 'ok'", &ctx).unwrap());
        assert!(evaluate("b == 1 || status === \"ok\"", &ctx).unwrap());
        assert!(evaluate("!(a > 5) and not b", &ctx).unwrap());
        assert!(!evaluate("a == 1 && (b == 1 || status != 'ok')", &ctx).unwrap());
    }

    #[test]
    fn missing_paths_are_null_and_never_ordered() {
        let ctx = json!({"nested": {"items": [3, 4]}});
        assert!(evaluate("missing == null", &ctx).unwrap());
        assert!(!evaluate("missing > 1", &ctx).unwrap());
        assert!(!evaluate("missing < 1", &ctx).unwrap());
        assert!(evaluate("nested.items.1 == 4", &ctx).unwrap());
    }

    #[test]
    fn loose_and_strict_equality_differ_on_strings() {
        let ctx = json!({"count": "10"});
        assert!(evaluate("count == 10", &ctx).unwrap());
        assert!(!evaluate("count === 10", &ctx).unwrap());
    }

    #[test]
    fn rejects_malformed_expressions() {
        let ctx = json!({});
        assert!(evaluate("value >", &ctx).is_err());
        assert!(evaluate("(a == 1", &ctx).is_err());
        assert!(evaluate("a = 1", &ctx).is_err());
        assert!(evaluate("'open", &ctx).is_err());
        assert!(evaluate("a == 1 b", &ctx).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let ctx = json!({"a": true});
        assert!(evaluate(&format!("{}a", "!".repeat(64)), &ctx).unwrap());
        let err = evaluate(&format!("{}a", "!".repeat(10_000)), &ctx).unwrap_err();
        assert!(matches!(err, FlowEngineError::Expression(_)));

        let nested = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(evaluate(&nested, &ctx).is_err());
        let chain = vec!["a"; 10_000].join(" || ");
        assert!(evaluate(&chain, &ctx).is_err());
        assert!(evaluate(&vec!["a"; 10].join(" && "), &ctx).unwrap());
    }
}

//! Expressions embedded in process models.
//!
//! A model string starting with `=` is an expression, anything else is a
//! static string. Supported forms are JSON literals (`=42`, `=[1,2]`), variable
//! paths (`=order.id`) and a single comparison of a path with a literal
//! (`=amount > 100`).

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    // Two-character operators first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Neq),
        ("<=", CompareOp::Lte),
        (">=", CompareOp::Gte),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    fn token(&self) -> &'static str {
        Self::TOKENS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(token, _)| *token)
            .unwrap_or("==")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Static(Value),
    Path(Vec<String>),
    Compare {
        path: Vec<String>,
        op: CompareOp,
        value: Value,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Static(Value::String(s)) => f.write_str(s),
            Expression::Static(value) => write!(f, "={value}"),
            Expression::Path(path) => write!(f, "={}", path.join(".")),
            Expression::Compare { path, op, value } => {
                write!(f, "={} {} {}", path.join("."), op.token(), value)
            }
        }
    }
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, String> {
        let Some(body) = source.strip_prefix('=') else {
            return Ok(Expression::Static(Value::String(source.to_string())));
        };
        let body = body.trim();
        if body.is_empty() {
            return Err(format!("empty expression '{source}'"));
        }
        if let Ok(literal) = serde_json::from_str::<Value>(body) {
            return Ok(Expression::Static(literal));
        }
        for (token, op) in CompareOp::TOKENS {
            if let Some((left, right)) = body.split_once(token) {
                let path = parse_path(left.trim())?;
                let value = serde_json::from_str(right.trim())
                    .map_err(|_| format!("expected a literal after '{token}' in '{source}'"))?;
                return Ok(Expression::Compare { path, op, value });
            }
        }
        Ok(Expression::Path(parse_path(body)?))
    }

    /// A static expression of the given string.
    pub fn literal(value: impl Into<String>) -> Self {
        Expression::Static(Value::String(value.into()))
    }

    /// Names of the variables the expression reads.
    pub fn variable_names(&self) -> Vec<&str> {
        match self {
            Expression::Static(_) => Vec::new(),
            Expression::Path(path) | Expression::Compare { path, .. } => {
                path.first().map(String::as_str).into_iter().collect()
            }
        }
    }
}

fn parse_path(source: &str) -> Result<Vec<String>, String> {
    let segments: Vec<String> = source.split('.').map(str::to_string).collect();
    let valid = segments.iter().all(|s| {
        !s.is_empty()
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !s.starts_with(|c: char| c.is_ascii_digit())
    });
    if valid {
        Ok(segments)
    } else {
        Err(format!("invalid variable path '{source}'"))
    }
}

/// Evaluates model expressions against a variable context.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &Expression, variables: &Map<String, Value>)
        -> Result<Value, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PathExpressionEvaluator;

impl PathExpressionEvaluator {
    fn resolve<'v>(path: &[String], variables: &'v Map<String, Value>) -> Result<&'v Value, String> {
        let (root, rest) = path
            .split_first()
            .ok_or_else(|| "empty variable path".to_string())?;
        let mut current = variables
            .get(root)
            .ok_or_else(|| format!("no variable found for name '{root}'"))?;
        for segment in rest {
            current = current
                .get(segment.as_str())
                .ok_or_else(|| format!("no property '{segment}' found in '{}'", path.join(".")))?;
        }
        Ok(current)
    }
}

impl ExpressionEvaluator for PathExpressionEvaluator {
    fn evaluate(
        &self,
        expression: &Expression,
        variables: &Map<String, Value>,
    ) -> Result<Value, String> {
        match expression {
            Expression::Static(value) => Ok(value.clone()),
            Expression::Path(path) => Self::resolve(path, variables).cloned(),
            Expression::Compare { path, op, value } => {
                let left = Self::resolve(path, variables)?;
                let result = match op {
                    CompareOp::Eq => left == value,
                    CompareOp::Neq => left != value,
                    ordering_op => {
                        let ordering = compare(left, value).ok_or_else(|| {
                            format!("cannot compare {left} with {value} using '{}'", op.token())
                        })?;
                        match ordering_op {
                            CompareOp::Lt => ordering == Ordering::Less,
                            CompareOp::Gt => ordering == Ordering::Greater,
                            CompareOp::Lte => ordering != Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        }
                    }
                };
                Ok(Value::Bool(result))
            }
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

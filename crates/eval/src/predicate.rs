//! Boolean rule expressions (`if:` blocks of rule files).
//!
//! An expression is a single-key mapping: `any`/`all` take a list of
//! sub-expressions, `not` takes one, and the binary operators take a
//! `[left, right]` pair. A string operand starting with `$` names a binding.

use pvmap_core::json::{compare, loose_eq, to_text};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// The expression is not a single-operator mapping.
    Malformed(String),
    UnknownOperator(String),
    /// A binary operator did not get exactly two arguments.
    Arity(String),
    /// An ordering comparison between values that have no order.
    Incomparable { op: String, left: String, right: String },
    InvalidRegex(String),
}

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateError::Malformed(msg) => write!(f, "{}", msg),
            PredicateError::UnknownOperator(op) => write!(f, "unsupported operator: {}", op),
            PredicateError::Arity(op) => write!(f, "operator '{}' requires two arguments", op),
            PredicateError::Incomparable { op, left, right } => {
                write!(f, "cannot apply '{}' to {} and {}", op, left, right)
            }
            PredicateError::InvalidRegex(msg) => write!(f, "invalid regex: {}", msg),
        }
    }
}

impl std::error::Error for PredicateError {}

// ──────────────────────────────────────────────
// Expression tree
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    In,
    Regex,
    StartsWith,
    Contains,
    Gt,
    Ge,
    Lt,
    Le,
}

impl BinaryOp {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => BinaryOp::Eq,
            "ne" => BinaryOp::Ne,
            "in" => BinaryOp::In,
            "regex" => BinaryOp::Regex,
            "startswith" => BinaryOp::StartsWith,
            "contains" => BinaryOp::Contains,
            "gt" => BinaryOp::Gt,
            "ge" => BinaryOp::Ge,
            "lt" => BinaryOp::Lt,
            "le" => BinaryOp::Le,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::In => "in",
            BinaryOp::Regex => "regex",
            BinaryOp::StartsWith => "startswith",
            BinaryOp::Contains => "contains",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
        }
    }
}

/// An operand: a `$name` binding reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Binding(String),
    Literal(Value),
}

impl Operand {
    fn parse(value: &Value) -> Operand {
        match value.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(name) => Operand::Binding(name.to_string()),
            None => Operand::Literal(value.clone()),
        }
    }

    /// Unbound names resolve to null.
    fn resolve<'a>(&'a self, bindings: &'a Map<String, Value>) -> &'a Value {
        match self {
            Operand::Binding(name) => bindings.get(name).unwrap_or(&Value::Null),
            Operand::Literal(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Any(Vec<BoolExpr>),
    All(Vec<BoolExpr>),
    Not(Box<BoolExpr>),
    Binary {
        op: BinaryOp,
        left: Operand,
        right: Operand,
    },
}

impl BoolExpr {
    /// Parse an expression from its JSON form.
    pub fn parse(value: &Value) -> Result<BoolExpr, PredicateError> {
        let Value::Object(map) = value else {
            return Err(PredicateError::Malformed(format!(
                "rule if must be a mapping, got {}",
                type_name(value)
            )));
        };
        if map.len() != 1 {
            return Err(PredicateError::Malformed(
                "rule if must contain a single operator".to_string(),
            ));
        }
        let Some((op, args)) = map.iter().next() else {
            return Err(PredicateError::Malformed("empty rule if".to_string()));
        };
        match op.as_str() {
            "any" => Ok(BoolExpr::Any(parse_list(op, args)?)),
            "all" => Ok(BoolExpr::All(parse_list(op, args)?)),
            "not" => Ok(BoolExpr::Not(Box::new(BoolExpr::parse(args)?))),
            name => {
                let op = BinaryOp::from_name(name)
                    .ok_or_else(|| PredicateError::UnknownOperator(name.to_string()))?;
                match args.as_array().map(Vec::as_slice) {
                    Some([left, right]) => Ok(BoolExpr::Binary {
                        op,
                        left: Operand::parse(left),
                        right: Operand::parse(right),
                    }),
                    _ => Err(PredicateError::Arity(name.to_string())),
                }
            }
        }
    }

    /// Evaluate against `bindings`. `any`/`all` short-circuit.
    pub fn eval(&self, bindings: &Map<String, Value>) -> Result<bool, PredicateError> {
        match self {
            BoolExpr::Any(items) => {
                for item in items {
                    if item.eval(bindings)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            BoolExpr::All(items) => {
                for item in items {
                    if !item.eval(bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BoolExpr::Not(inner) => Ok(!inner.eval(bindings)?),
            BoolExpr::Binary { op, left, right } => {
                eval_binary(*op, left.resolve(bindings), right.resolve(bindings))
            }
        }
    }
}

fn parse_list(op: &str, args: &Value) -> Result<Vec<BoolExpr>, PredicateError> {
    match args {
        Value::Array(items) => items.iter().map(BoolExpr::parse).collect(),
        _ => Err(PredicateError::Malformed(format!(
            "operator '{}' requires a list",
            op
        ))),
    }
}

/// Evaluate an optional `if:` value; absent or null is true.
pub fn eval_condition(
    expr: Option<&Value>,
    bindings: &Map<String, Value>,
) -> Result<bool, PredicateError> {
    match expr {
        None | Some(Value::Null) => Ok(true),
        Some(value) => BoolExpr::parse(value)?.eval(bindings),
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, PredicateError> {
    if left.is_null() || right.is_null() {
        return Ok(match op {
            BinaryOp::Eq => left.is_null() && right.is_null(),
            BinaryOp::Ne => !(left.is_null() && right.is_null()),
            _ => false,
        });
    }
    match op {
        BinaryOp::Eq => Ok(loose_eq(left, right)),
        BinaryOp::Ne => Ok(!loose_eq(left, right)),
        BinaryOp::In => Ok(contains(right, left)),
        BinaryOp::Contains => Ok(match left {
            Value::Array(items) => items.iter().any(|item| loose_eq(item, right)),
            _ => to_text(left).contains(&to_text(right)),
        }),
        BinaryOp::Regex => {
            let re = Regex::new(&to_text(right))
                .map_err(|e| PredicateError::InvalidRegex(e.to_string()))?;
            Ok(re.is_match(&to_text(left)))
        }
        BinaryOp::StartsWith => Ok(to_text(left).starts_with(&to_text(right))),
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            let ordering = compare(left, right).ok_or_else(|| PredicateError::Incomparable {
                op: op.name().to_string(),
                left: type_name(left).to_string(),
                right: type_name(right).to_string(),
            })?;
            Ok(match op {
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

/// `needle in haystack`: list membership, substring, or object key.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|n| map.contains_key(n)),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

//! Built-in transform factories.
//!
//! Each factory takes the `with:` options from a transform source and
//! returns a [`Transform`]. Unless noted, a null input yields null and list
//! inputs are processed element-wise.

use super::{Signature, Transform, TransformArgs};
use crate::error::TransformError;
use crate::json::to_text;
use serde_json::{Map, Number, Value};

/// Names accepted as `builtin:` in transform sources.
pub const BUILTINS: &[&str] = &[
    "identity", "first", "last", "element", "to_int", "to_float", "to_str", "scale", "round",
    "join", "lower", "upper", "strip", "flatten", "lookup", "format", "coalesce", "collect",
];

/// Build the builtin `builtin` under the name `name`.
///
/// Returns `Ok(None)` for an unknown builtin and `Err` for bad options.
pub fn build(builtin: &str, name: &str, options: &Map<String, Value>) -> Result<Option<Transform>, String> {
    let transform = match builtin {
        "identity" => Transform::unary(name, Ok),
        "first" => Transform::unary(name, |v| Ok(pick(v, 0))),
        "last" => Transform::unary(name, |v| Ok(pick(v, -1))),
        "element" => {
            let index = int_option(options, "index")?.ok_or("element requires 'index'")?;
            Transform::unary(name, move |v| Ok(pick(v, index)))
        }
        "to_int" => Transform::unary(name, |v| map_leaves(v, &to_int)),
        "to_float" => Transform::unary(name, |v| map_leaves(v, &to_float)),
        "to_str" => Transform::unary(name, |v| {
            Ok(if v.is_null() { v } else { Value::String(to_text(&v)) })
        }),
        "scale" => {
            let factor = float_option(options, "factor")?.unwrap_or(1.0);
            let offset = float_option(options, "offset")?.unwrap_or(0.0);
            Transform::unary(name, move |v| {
                map_leaves(v, &|x| number_op(x, "scale", |f| f * factor + offset))
            })
        }
        "round" => {
            let decimals = int_option(options, "decimals")?.unwrap_or(0);
            let factor = 10f64.powi(decimals as i32);
            Transform::unary(name, move |v| {
                map_leaves(v, &|x| number_op(x, "round", |f| (f * factor).round() / factor))
            })
        }
        "join" => {
            let sep = str_option(options, "sep")?.unwrap_or_else(|| " ".to_string());
            Transform::unary(name, move |v| {
                Ok(match v {
                    Value::Null => Value::Null,
                    Value::Array(items) => Value::String(
                        items.iter().map(to_text).collect::<Vec<_>>().join(&sep),
                    ),
                    other => Value::String(to_text(&other)),
                })
            })
        }
        "lower" => Transform::unary(name, |v| map_leaves(v, &|x| text_op(x, |s| s.to_lowercase()))),
        "upper" => Transform::unary(name, |v| map_leaves(v, &|x| text_op(x, |s| s.to_uppercase()))),
        "strip" => Transform::unary(name, |v| map_leaves(v, &|x| text_op(x, |s| s.trim().to_string()))),
        "flatten" => Transform::unary(name, |v| {
            Ok(match v {
                Value::Array(items) => {
                    let mut out = Vec::new();
                    flatten_into(items, &mut out);
                    Value::Array(out)
                }
                other => other,
            })
        }),
        "lookup" => {
            let table = match options.get("table") {
                Some(Value::Object(table)) => table.clone(),
                _ => return Err("lookup requires a 'table' mapping".to_string()),
            };
            let default = options.get("default").cloned();
            Transform::unary(name, move |v| Ok(lookup(&table, default.as_ref(), v)))
        }
        "format" => {
            let template = str_option(options, "template")?.ok_or("format requires 'template'")?;
            Transform::new(name, Signature::new().var_keywords(), move |args| {
                format_template(&template, args)
            })
        }
        "coalesce" => Transform::new(name, Signature::new().var_keywords(), |args| {
            Ok(match args {
                TransformArgs::Value(v) => v,
                TransformArgs::Keywords(kw) => kw
                    .into_iter()
                    .map(|(_, v)| v)
                    .find(|v| !v.is_null())
                    .unwrap_or(Value::Null),
            })
        }),
        "collect" => Transform::new(name, Signature::new().var_keywords(), |args| {
            Ok(match args {
                TransformArgs::Value(v) => v,
                TransformArgs::Keywords(kw) => Value::Object(kw),
            })
        }),
        _ => return Ok(None),
    };
    Ok(Some(transform))
}

fn int_option(options: &Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    match options.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("option '{}' must be an integer", key)),
    }
}

fn float_option(options: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match options.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("option '{}' must be a number", key)),
    }
}

fn str_option(options: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match options.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("option '{}' must be a string", key)),
    }
}

fn pick(value: Value, index: i64) -> Value {
    match value {
        Value::Array(mut items) => {
            let len = items.len() as i64;
            let idx = if index < 0 { len + index } else { index };
            if (0..len).contains(&idx) {
                items.swap_remove(idx as usize)
            } else {
                Value::Null
            }
        }
        other => other,
    }
}

fn map_leaves(
    value: Value,
    op: &dyn Fn(Value) -> Result<Value, TransformError>,
) -> Result<Value, TransformError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => items
            .into_iter()
            .map(|v| map_leaves(v, op))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => op(other),
    }
}

fn float_value(f: f64) -> Result<Value, TransformError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TransformError::new(format!("{} is not a finite number", f)))
}

fn number_op(value: Value, op: &str, f: impl Fn(f64) -> f64) -> Result<Value, TransformError> {
    match value.as_f64() {
        Some(x) => float_value(f(x)),
        None => Err(TransformError::new(format!(
            "{} expects a number, got {}",
            op, value
        ))),
    }
}

fn text_op(value: Value, f: impl Fn(&str) -> String) -> Result<Value, TransformError> {
    Ok(match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    })
}

fn to_int(value: Value) -> Result<Value, TransformError> {
    match &value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
        Value::Number(n) => Ok(Value::from(n.as_f64().unwrap_or_default().trunc() as i64)),
        Value::Bool(b) => Ok(Value::from(*b as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<f64>().map(|f| Value::from(f.trunc() as i64)))
                .map_err(|_| TransformError::new(format!("cannot convert '{}' to int", s)))
        }
        other => Err(TransformError::new(format!("cannot convert {} to int", other))),
    }
}

fn to_float(value: Value) -> Result<Value, TransformError> {
    match &value {
        Value::Number(n) => float_value(n.as_f64().unwrap_or_default()),
        Value::Bool(b) => float_value(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TransformError::new(format!("cannot convert '{}' to float", s)))
            .and_then(float_value),
        other => Err(TransformError::new(format!("cannot convert {} to float", other))),
    }
}

fn flatten_into(items: Vec<Value>, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten_into(inner, out),
            other => out.push(other),
        }
    }
}

fn lookup(table: &Map<String, Value>, default: Option<&Value>, value: Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match table.get(&to_text(&value)) {
        Some(found) => found.clone(),
        None => default.cloned().unwrap_or(value),
    }
}

/// Substitute `{name}` placeholders. A positional call binds `{value}`.
/// Any placeholder bound to null, or not bound at all, yields null.
fn format_template(template: &str, args: TransformArgs) -> Result<Value, TransformError> {
    let bindings = match args {
        TransformArgs::Value(v) => {
            let mut kw = Map::new();
            kw.insert("value".to_string(), v);
            kw
        }
        TransformArgs::Keywords(kw) => kw,
    };
    let mut out = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TransformError::new(format!("unclosed placeholder in '{}'", template)))?;
        match bindings.get(&after[..close]) {
            Some(v) if !v.is_null() => out.push_str(&to_text(v)),
            _ => return Ok(Value::Null),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make(builtin: &str, options: Value) -> Transform {
        let options = options.as_object().cloned().unwrap_or_default();
        build(builtin, builtin, &options).unwrap().unwrap()
    }

    fn kw(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn every_listed_builtin_builds() {
        let options = json!({"index": 0, "table": {}, "template": "{value}"});
        let options = options.as_object().unwrap();
        for name in BUILTINS {
            assert!(build(name, name, options).unwrap().is_some(), "{}", name);
        }
        assert!(build("nope", "nope", options).unwrap().is_none());
    }

    #[test]
    fn pick_elements() {
        assert_eq!(make("first", json!({})).call_value(json!([1, 2])).unwrap(), json!(1));
        assert_eq!(make("last", json!({})).call_value(json!([1, 2])).unwrap(), json!(2));
        assert_eq!(make("first", json!({})).call_value(json!([])).unwrap(), Value::Null);
        assert_eq!(
            make("element", json!({"index": -2})).call_value(json!([1, 2, 3])).unwrap(),
            json!(2)
        );
        assert!(build("element", "e", &Map::new()).is_err());
    }

    #[test]
    fn numeric_conversions_pass_null_through() {
        let to_int = make("to_int", json!({}));
        assert_eq!(to_int.call_value(json!("12")).unwrap(), json!(12));
        assert_eq!(to_int.call_value(json!(3.9)).unwrap(), json!(3));
        assert_eq!(to_int.call_value(Value::Null).unwrap(), Value::Null);
        assert!(to_int.call_value(json!("abc")).is_err());
        let to_float = make("to_float", json!({}));
        assert_eq!(to_float.call_value(json!([1, "2.5"])).unwrap(), json!([1.0, 2.5]));
    }

    #[test]
    fn scale_and_round() {
        let scale = make("scale", json!({"factor": 0.5, "offset": 1}));
        assert_eq!(scale.call_value(json!([10, 20])).unwrap(), json!([6.0, 11.0]));
        assert!(scale.call_value(json!("x")).is_err());
        let round = make("round", json!({"decimals": 2}));
        assert_eq!(round.call_value(json!(1.23456)).unwrap(), json!(1.23));
    }

    #[test]
    fn join_and_text_ops() {
        let join = make("join", json!({"sep": "x"}));
        assert_eq!(join.call_value(json!([64, 64])).unwrap(), json!("64x64"));
        let upper = make("upper", json!({}));
        assert_eq!(upper.call_value(json!(["a", 1])).unwrap(), json!(["A", 1]));
        let strip = make("strip", json!({}));
        assert_eq!(strip.call_value(json!("  a ")).unwrap(), json!("a"));
    }

    #[test]
    fn lookup_falls_back_to_default_then_value() {
        let with_default = make("lookup", json!({"table": {"1": "one"}, "default": "many"}));
        assert_eq!(with_default.call_value(json!(1)).unwrap(), json!("one"));
        assert_eq!(with_default.call_value(json!(5)).unwrap(), json!("many"));
        let no_default = make("lookup", json!({"table": {"a": "A"}}));
        assert_eq!(no_default.call_value(json!("b")).unwrap(), json!("b"));
    }

    #[test]
    fn format_with_keywords_and_positional() {
        let fmt = make("format", json!({"template": "{a}_{b}"}));
        assert!(fmt.signature().accepts_any_keywords());
        assert_eq!(
            fmt.call_keywords(kw(json!({"a": "x", "b": 2}))).unwrap(),
            json!("x_2")
        );
        assert_eq!(
            fmt.call_keywords(kw(json!({"a": "x", "b": null}))).unwrap(),
            Value::Null
        );
        let positional = make("format", json!({"template": "sub-{value}"}));
        assert_eq!(positional.call_value(json!("01")).unwrap(), json!("sub-01"));
    }

    #[test]
    fn coalesce_and_collect() {
        let coalesce = make("coalesce", json!({}));
        assert_eq!(
            coalesce.call_keywords(kw(json!({"a": null, "b": 2, "c": 3}))).unwrap(),
            json!(2)
        );
        let collect = make("collect", json!({}));
        assert_eq!(
            collect.call_keywords(kw(json!({"x": 1}))).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn flatten_nested_lists() {
        let flatten = make("flatten", json!({}));
        assert_eq!(flatten.call_value(json!([[1, [2]], 3])).unwrap(), json!([1, 2, 3]));
    }
}

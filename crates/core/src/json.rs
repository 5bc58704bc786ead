//! Helpers over `serde_json::Value` shared by the remapping engine, rule
//! predicates, map overlays and built-in transforms.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Text form of a value: strings verbatim, scalars via their JSON
/// rendering, containers as compact JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Equality where `1` and `1.0` are the same number.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| loose_eq(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| loose_eq(v, w)))
        }
        _ => a == b,
    }
}

/// Ordering for `gt`/`ge`/`lt`/`le`: numbers numerically, strings
/// lexicographically, arrays element-wise. `None` for any other pairing.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => Some(i.cmp(&j)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (p, q) in x.iter().zip(y) {
                match compare(p, q)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

/// Follow a dotted path (`a.b.c`) through nested objects.
pub fn get_nested<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, part| node.as_object()?.get(part))
}

/// Follow a dotted path through a top-level object.
pub fn get_nested_in<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = root.get(parts.next()?)?;
    parts.try_fold(first, |node, part| node.as_object()?.get(part))
}

/// Write `value` at a dotted path, creating intermediate objects and
/// replacing intermediates that are not objects.
pub fn set_nested(root: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                set_nested(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_equality_across_number_kinds() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(loose_eq(&json!([1, "a"]), &json!([1.0, "a"])));
        assert!(!loose_eq(&json!(1), &json!("1")));
    }

    #[test]
    fn compare_mixed_kinds_is_none() {
        assert_eq!(compare(&json!(2), &json!(1.5)), Some(Ordering::Greater));
        assert_eq!(compare(&json!("a"), &json!("b")), Some(Ordering::Less));
        assert_eq!(compare(&json!([1, 2]), &json!([1, 3])), Some(Ordering::Less));
        assert_eq!(compare(&json!(1), &json!("1")), None);
    }

    #[test]
    fn set_nested_builds_and_replaces() {
        let mut root = Map::new();
        set_nested(&mut root, "a.b.c", json!(1));
        set_nested(&mut root, "a.b.d", json!(2));
        set_nested(&mut root, "x", json!(3));
        set_nested(&mut root, "x.y", json!(4));
        assert_eq!(
            Value::Object(root),
            json!({"a": {"b": {"c": 1, "d": 2}}, "x": {"y": 4}})
        );
    }

    #[test]
    fn get_nested_paths() {
        let v = json!({"a": {"b": 1}, "c": null});
        assert_eq!(get_nested(&v, "a.b"), Some(&json!(1)));
        assert_eq!(get_nested(&v, "a.z"), None);
        assert_eq!(get_nested(&v, "c"), Some(&Value::Null));
        assert_eq!(get_nested(&v, "c.d"), None);
    }

    #[test]
    fn to_text_forms() {
        assert_eq!(to_text(&json!("x")), "x");
        assert_eq!(to_text(&json!(2)), "2");
        assert_eq!(to_text(&json!(2.5)), "2.5");
        assert_eq!(to_text(&json!(true)), "true");
    }
}

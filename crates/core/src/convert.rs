//! Value conversion for parameter-file data.
//!
//! Raw value text goes through these stages, in order:
//!
//! 1. `<$Bis...#>` token arrays short-circuit everything else.
//! 2. Run-length tokens `@N*(v)` are expanded.
//! 3. Nested arrays `((...)...)` go to [`crate::nested`].
//! 4. A single `<...>` string is unwrapped.
//! 5. Parenthesised groups, comma lists and whitespace lists are split.
//!
//! Lists are reshaped to a declared multi-dimensional shape when every
//! leaf is numeric.

use crate::error::ParamError;
use crate::nested;
use crate::value::{Matrix, MatrixData, ParsedValue};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());
static ENG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9.]+e-?[0-9.]+$").unwrap());
static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-*\d+$").unwrap());
static STRING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<([^>]*)>$").unwrap());
static BIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(\$Bis[^>]*)#>").unwrap());
static ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^()]*)\)").unwrap());
static COMPLEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(\s*\(.*\)$").unwrap());
static RUN_LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\d*)\*\(([-]?\d*[.]?\d*[eE]?[-]?\d*?)\)").unwrap());

/// A declared value shape, taken from the `##$KEY=( ... )` line when the
/// data itself sits on continuation lines.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// No shape declared.
    None,
    /// `( n )`: a plain length. No reshape happens.
    Flat(String),
    /// `( d1, d2, ... )`: reshape target.
    Dims(Vec<usize>),
}

impl Shape {
    /// Parse the shape text of parameter `key`.
    pub fn parse(key: &str, raw: &str) -> Result<Shape, ParamError> {
        let trimmed = raw.trim();
        let inner = ARRAY_RE.replace_all(trimmed, "$1");
        if !inner.contains(',') {
            return Ok(Shape::Flat(inner.trim().to_string()));
        }
        let mut dims = Vec::new();
        for part in inner.split(',') {
            match convert_string_to(part) {
                ParsedValue::Int(n) if n >= 0 => dims.push(n as usize),
                _ => {
                    return Err(ParamError::MalformedShape {
                        key: key.to_string(),
                        shape: trimmed.to_string(),
                    })
                }
            }
        }
        Ok(Shape::Dims(dims))
    }
}

/// Convert one scalar token.
///
/// A single enclosing `<...>` is removed; the empty string becomes
/// [`ParsedValue::Null`]. Numeric-looking text becomes `Float`/`Int`, falling
/// back to a string when the number does not parse.
pub fn convert_string_to(raw: &str) -> ParsedValue {
    let mut s = raw.trim();
    if let Some(caps) = STRING_RE.captures(s) {
        s = caps.get(1).map_or("", |m| m.as_str());
    }
    if s.is_empty() {
        return ParsedValue::Null;
    }
    if FLOAT_RE.is_match(s) || ENG_RE.is_match(s) {
        return s
            .parse::<f64>()
            .map(ParsedValue::Float)
            .unwrap_or_else(|_| ParsedValue::Str(s.to_string()));
    }
    if INT_RE.is_match(s) {
        if let Ok(i) = s.parse::<i64>() {
            return ParsedValue::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return ParsedValue::Float(f);
        }
    }
    ParsedValue::Str(s.to_string())
}

/// Expand every `@N*(v)` token into `N` space-joined copies of `v`.
///
/// Distinct tokens are collected first and each is substituted everywhere it
/// appears. Tokens with an empty count are left alone.
pub fn expand_run_lengths(data: &str) -> String {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for caps in RUN_LENGTH_RE.captures_iter(data) {
        let whole = caps[0].to_string();
        if seen.insert(whole.clone()) {
            tokens.push((whole, caps[1].to_string(), caps[2].to_string()));
        }
    }
    let mut out = data.to_string();
    for (token, count, value) in tokens {
        let Ok(count) = count.parse::<usize>() else {
            continue;
        };
        let expanded = vec![value.as_str(); count].join(" ");
        out = out.replace(&token, &expanded);
    }
    out
}

/// Split `s` at characters matching `is_sep`, ignoring separators inside
/// `<...>` quoted regions.
pub(crate) fn split_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => quoted = true,
            '>' => quoted = false,
            c if !quoted && is_sep(c) => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn has_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> bool {
    split_unquoted(s, is_sep).len() > 1
}

fn convert_all<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<ParsedValue> {
    parts.into_iter().map(convert_string_to).collect()
}

fn process_bis(tokens: Vec<&str>, shape: &Shape) -> ParsedValue {
    let mut elements = convert_all(tokens);
    if elements.len() == 1 {
        return elements.remove(0);
    }
    if let Shape::Dims(dims) = shape {
        if dims.first() == Some(&elements.len()) && elements.iter().all(ParsedValue::is_str) {
            return ParsedValue::Seq(
                elements
                    .iter()
                    .filter_map(ParsedValue::as_str)
                    .map(|e| {
                        ParsedValue::Seq(
                            e.split(',').map(|p| ParsedValue::Str(p.to_string())).collect(),
                        )
                    })
                    .collect(),
            );
        }
    }
    ParsedValue::Seq(elements)
}

/// Split list-like data. Returns `None` when the data is a single scalar.
fn parse_data(data: &str) -> Option<Vec<ParsedValue>> {
    let groups: Vec<&str> = ARRAY_RE
        .captures_iter(data)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if groups.len() == 1 {
        let group = groups[0];
        if group.contains(',') {
            return Some(convert_all(group.split(',')));
        }
        return Some(vec![convert_string_to(group)]);
    }
    if !groups.is_empty() {
        if groups.iter().any(|g| g.contains(',')) {
            return Some(
                groups
                    .iter()
                    .map(|g| ParsedValue::Seq(convert_all(g.split(','))))
                    .collect(),
            );
        }
        return Some(convert_all(groups));
    }
    if has_unquoted(data, |c| c == ',') {
        return Some(convert_all(split_unquoted(data, |c| c == ',')));
    }
    if has_unquoted(data, char::is_whitespace) {
        return Some(convert_all(
            split_unquoted(data, char::is_whitespace)
                .into_iter()
                .filter(|p| !p.is_empty()),
        ));
    }
    None
}

fn numeric_leaves(items: &[ParsedValue], out: &mut Vec<ParsedValue>) -> bool {
    for item in items {
        match item {
            ParsedValue::Int(_) | ParsedValue::Float(_) => out.push(item.clone()),
            ParsedValue::Seq(inner) => {
                if !numeric_leaves(inner, out) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

fn reshape(key: &str, items: Vec<ParsedValue>, shape: &Shape) -> Result<ParsedValue, ParamError> {
    let Shape::Dims(dims) = shape else {
        return Ok(ParsedValue::Seq(items));
    };
    let mut leaves = Vec::new();
    if !numeric_leaves(&items, &mut leaves) {
        return Ok(ParsedValue::Seq(items));
    }
    let data = if leaves.iter().all(|v| matches!(v, ParsedValue::Int(_))) {
        MatrixData::Int(leaves.iter().filter_map(ParsedValue::as_i64).collect())
    } else {
        MatrixData::Float(leaves.iter().filter_map(ParsedValue::as_f64).collect())
    };
    let count = data.len();
    Matrix::new(dims.clone(), data)
        .map(ParsedValue::Matrix)
        .ok_or_else(|| ParamError::ShapeMismatch {
            key: key.to_string(),
            count,
            shape: dims.clone(),
        })
}

/// Convert the data text of parameter `key` under a declared `shape`.
pub fn convert_data_to(key: &str, data: &str, shape: &Shape) -> Result<ParsedValue, ParamError> {
    let data = data.trim();
    let bis: Vec<&str> = BIS_RE
        .captures_iter(data)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !bis.is_empty() {
        return Ok(process_bis(bis, shape));
    }

    let data = expand_run_lengths(data);
    if COMPLEX_RE.is_match(&data) {
        return nested::parse_levels(key, &data).map(ParsedValue::Leveled);
    }
    if STRING_RE.is_match(&data) {
        return Ok(convert_string_to(&data));
    }
    match parse_data(&data) {
        Some(items) => reshape(key, items, shape),
        None => Ok(convert_string_to(&data)),
    }
}

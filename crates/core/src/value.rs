//! Typed values produced by the parameter-file parser.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A single parsed parameter value.
///
/// Values are produced once per key when a parameter file is parsed and are
/// never mutated afterwards. [`ParsedValue::to_json`] gives the form consumed
/// by the remapping engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ParsedValue>),
    /// Numeric data reshaped to a declared row-major shape.
    Matrix(Matrix),
    /// Nested parenthesised arrays, grouped by nesting height.
    Leveled(Levels),
}

/// Row-major numeric array with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    shape: Vec<usize>,
    data: MatrixData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixData {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl MatrixData {
    pub fn len(&self) -> usize {
        match self {
            MatrixData::Int(v) => v.len(),
            MatrixData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn json_at(&self, idx: usize) -> Value {
        match self {
            MatrixData::Int(v) => Value::from(v[idx]),
            MatrixData::Float(v) => float_json(v[idx]),
        }
    }
}

impl Matrix {
    /// Build a matrix, returning `None` when `data` does not fill `shape`.
    pub fn new(shape: Vec<usize>, data: MatrixData) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Matrix { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &MatrixData {
        &self.data
    }

    /// Element at a multi-dimensional index, as JSON.
    pub fn get(&self, index: &[usize]) -> Option<Value> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (i, dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        Some(self.data.json_at(flat))
    }

    fn nest(&self, dim: usize, offset: usize) -> Value {
        let len = self.shape[dim];
        if dim + 1 == self.shape.len() {
            return Value::Array((0..len).map(|i| self.data.json_at(offset + i)).collect());
        }
        let stride: usize = self.shape[dim + 1..].iter().product();
        Value::Array(
            (0..len)
                .map(|i| self.nest(dim + 1, offset + i * stride))
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        if self.shape.is_empty() {
            return Value::Array(Vec::new());
        }
        self.nest(0, 0)
    }
}

/// Groups of a nested array keyed by level (innermost groups are level 1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Levels(BTreeMap<usize, Vec<Vec<ParsedValue>>>);

impl Levels {
    pub fn new() -> Self {
        Levels(BTreeMap::new())
    }

    pub fn push(&mut self, level: usize, group: Vec<ParsedValue>) {
        self.0.entry(level).or_default().push(group);
    }

    pub fn level(&self, level: usize) -> Option<&[Vec<ParsedValue>]> {
        self.0.get(&level).map(Vec::as_slice)
    }

    pub fn depth(&self) -> usize {
        self.0.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (level, groups) in &self.0 {
            let groups = groups
                .iter()
                .map(|g| Value::Array(g.iter().map(ParsedValue::to_json).collect()))
                .collect();
            out.insert(format!("level_{}", level), Value::Array(groups));
        }
        Value::Object(out)
    }
}

fn float_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

impl ParsedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParsedValue::Null)
    }

    pub fn is_str(&self) -> bool {
        matches!(self, ParsedValue::Str(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParsedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParsedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParsedValue::Int(i) => Some(*i as f64),
            ParsedValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParsedValue::Null => Value::Null,
            ParsedValue::Int(i) => Value::from(*i),
            ParsedValue::Float(f) => float_json(*f),
            ParsedValue::Str(s) => Value::String(s.clone()),
            ParsedValue::Seq(items) => Value::Array(items.iter().map(ParsedValue::to_json).collect()),
            ParsedValue::Matrix(m) => m.to_json(),
            ParsedValue::Leveled(levels) => levels.to_json(),
        }
    }
}

impl From<&ParsedValue> for Value {
    fn from(v: &ParsedValue) -> Self {
        v.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matrix_nests_row_major() {
        let m = Matrix::new(vec![2, 3], MatrixData::Int(vec![1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(m.to_json(), json!([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(m.get(&[1, 0]), Some(json!(4)));
        assert_eq!(m.get(&[2, 0]), None);
    }

    #[test]
    fn matrix_rejects_wrong_count() {
        assert!(Matrix::new(vec![2, 2], MatrixData::Float(vec![1.0, 2.0, 3.0])).is_none());
    }

    #[test]
    fn levels_serialize_by_name() {
        let mut levels = Levels::new();
        levels.push(1, vec![ParsedValue::Int(1), ParsedValue::Int(2)]);
        levels.push(2, vec![ParsedValue::Str("a".into())]);
        assert_eq!(
            levels.to_json(),
            json!({"level_1": [[1, 2]], "level_2": [["a"]]})
        );
        assert_eq!(levels.depth(), 2);
    }

    #[test]
    fn nan_serializes_as_null() {
        assert_eq!(ParsedValue::Float(f64::NAN).to_json(), Value::Null);
    }
}

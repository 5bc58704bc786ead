//! JCAMP-DX style parameter files.
//!
//! ```text
//! ##TITLE=Parameter List
//! ##$PVM_Matrix=( 2 )
//! 64 64
//! $$ comment lines are ignored
//! ##END=
//! ```
//!
//! `##KEY=` lines are headers, `##$KEY=` lines are parameters. Lines that
//! follow a `##` line up to the next one are continuation data; when present
//! the `##` value is the declared shape and the continuation is the data.

use crate::convert::{convert_data_to, convert_string_to, Shape};
use crate::error::ParamError;
use crate::source::SourceProvider;
use crate::value::ParsedValue;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Parameter,
}

/// One `##` record of a parameter file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub key: String,
    pub kind: LineKind,
    /// Zero-based line number of the `##` line.
    pub line: usize,
    /// Value text after the `=`, continuation lines joined by spaces.
    pub raw: String,
    pub value: ParsedValue,
}

/// Parsed contents of one parameter file (method, acqp, visu_pars, reco,
/// subject), in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    entries: Vec<ParamEntry>,
    params: HashMap<String, usize>,
    headers: HashMap<String, usize>,
}

struct Record<'a> {
    line: usize,
    key: &'a str,
    kind: LineKind,
    value: &'a str,
    continuation: Vec<&'a str>,
}

fn split_record(line: &str) -> Option<(&str, LineKind, &str)> {
    let rest = line.strip_prefix("##")?;
    let (key, value) = rest.split_once('=')?;
    match key.strip_prefix('$') {
        Some(param) => Some((param, LineKind::Parameter, value)),
        None => Some((key, LineKind::Header, value)),
    }
}

impl ParameterTable {
    /// Parse parameter-file text.
    pub fn parse(text: &str) -> Result<Self, ParamError> {
        Self::parse_named(text, "<memory>")
    }

    /// Parse parameter-file text; `origin` names the source in errors.
    pub fn parse_named(text: &str, origin: &str) -> Result<Self, ParamError> {
        let mut records: Vec<Record> = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            if let Some((key, kind, value)) = split_record(line) {
                records.push(Record {
                    line: line_num,
                    key,
                    kind,
                    value,
                    continuation: Vec::new(),
                });
                continue;
            }
            if line.starts_with("##") || line.trim_start().starts_with("$$") {
                continue;
            }
            if let Some(current) = records.last_mut() {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    current.continuation.push(trimmed);
                }
            }
        }
        if records.is_empty() {
            return Err(ParamError::NotParameterFile {
                origin: origin.to_string(),
            });
        }

        let mut table = ParameterTable::default();
        for record in records {
            table.push(record_to_entry(record)?);
        }
        Ok(table)
    }

    /// Read and parse a parameter file through `provider`.
    pub fn load(path: &Path, provider: &dyn SourceProvider) -> Result<Self, ParamError> {
        let text = provider.read_source(path).map_err(|e| ParamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_named(&text, &path.to_string_lossy())
    }

    /// Build a table of parameters directly from values.
    pub fn from_values<K: Into<String>>(values: impl IntoIterator<Item = (K, ParsedValue)>) -> Self {
        let mut table = ParameterTable::default();
        for (line, (key, value)) in values.into_iter().enumerate() {
            table.push(ParamEntry {
                key: key.into(),
                kind: LineKind::Parameter,
                line,
                raw: String::new(),
                value,
            });
        }
        table
    }

    fn push(&mut self, entry: ParamEntry) {
        let idx = self.entries.len();
        let index = match entry.kind {
            LineKind::Parameter => &mut self.params,
            LineKind::Header => &mut self.headers,
        };
        index.insert(entry.key.clone(), idx);
        self.entries.push(entry);
    }

    /// Value of parameter `key` (a `##$KEY` record).
    pub fn get(&self, key: &str) -> Option<&ParsedValue> {
        self.entry(key).map(|e| &e.value)
    }

    pub fn entry(&self, key: &str) -> Option<&ParamEntry> {
        self.params.get(key).map(|&i| &self.entries[i])
    }

    /// Value of header `key` (a `##KEY` record).
    pub fn header(&self, key: &str) -> Option<&ParsedValue> {
        self.headers.get(key).map(|&i| &self.entries[i].value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Parameter keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.kind == LineKind::Parameter)
            .map(|e| e.key.as_str())
    }

    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters whose key contains `query`, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<&ParamEntry> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.kind == LineKind::Parameter && e.key.to_lowercase().contains(&needle))
            .collect()
    }

    /// Parameters as a JSON object in file order.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for key in self.keys() {
            if let Some(value) = self.get(key) {
                out.insert(key.to_string(), value.to_json());
            }
        }
        Value::Object(out)
    }

    /// Headers as a JSON object in file order.
    pub fn headers_json(&self) -> Value {
        let mut out = Map::new();
        for e in self.entries.iter().filter(|e| e.kind == LineKind::Header) {
            out.insert(e.key.clone(), e.value.to_json());
        }
        Value::Object(out)
    }
}

fn record_to_entry(record: Record) -> Result<ParamEntry, ParamError> {
    let value = record.value.trim();
    let continuation = record.continuation.join(" ");

    if record.kind == LineKind::Header {
        let raw = if continuation.is_empty() {
            value.to_string()
        } else {
            format!("{} {}", value, continuation)
        };
        return Ok(ParamEntry {
            key: record.key.to_string(),
            kind: record.kind,
            line: record.line,
            value: convert_string_to(&raw),
            raw,
        });
    }

    let is_shape = value.starts_with('(') && value.ends_with(')');
    let (data, shape) = if continuation.is_empty() {
        (value.to_string(), Shape::None)
    } else if is_shape {
        (continuation, Shape::parse(record.key, value)?)
    } else {
        (format!("{} {}", value, continuation), Shape::None)
    };
    let parsed = convert_data_to(record.key, &data, &shape)?;
    let raw = match &shape {
        Shape::None => data,
        _ => format!("{} {}", value, data),
    };
    Ok(ParamEntry {
        key: record.key.to_string(),
        kind: record.kind,
        line: record.line,
        raw,
        value: parsed,
    })
}

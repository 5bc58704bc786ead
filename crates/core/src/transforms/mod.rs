//! Named transforms applied to resolved values.
//!
//! A [`Transform`] is a pure function with a declared [`Signature`]. It is
//! called either positionally with one value (from a `sources` chain) or
//! with keywords (from an `inputs` block). Specs never carry code: their
//! `transforms_source` files bind public names to the compiled built-ins in
//! [`builtin`], and applications may register their own closures.

pub mod builtin;
pub mod manifest;

use crate::error::{SpecError, TransformError};
use crate::source::SourceProvider;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments handed to a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformArgs {
    /// A single positional value.
    Value(Value),
    /// Named inputs, in declaration order.
    Keywords(Map<String, Value>),
}

impl TransformArgs {
    /// The value bound to `param`: the positional value, or the keyword of
    /// that name (null when absent).
    pub fn single(self, param: &str) -> Value {
        match self {
            TransformArgs::Value(v) => v,
            TransformArgs::Keywords(mut kw) => kw.remove(param).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub required: bool,
}

/// Parameter names a transform accepts when called with keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
    var_keywords: bool,
}

impl Signature {
    pub fn new() -> Self {
        Signature::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            required: false,
        });
        self
    }

    /// Accept arbitrary keyword names.
    pub fn var_keywords(mut self) -> Self {
        self.var_keywords = true;
        self
    }

    pub fn accepts_any_keywords(&self) -> bool {
        self.var_keywords
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Compare provided keyword names against the declared parameters.
    /// Returns sorted `(extra, missing)` name lists; both are empty when the
    /// call fits. Variadic signatures always fit.
    pub fn mismatch<'a>(&self, provided: impl IntoIterator<Item = &'a str>) -> (Vec<String>, Vec<String>) {
        if self.var_keywords {
            return (Vec::new(), Vec::new());
        }
        let provided: Vec<&str> = provided.into_iter().collect();
        let mut extra: Vec<String> = provided
            .iter()
            .filter(|name| !self.params.iter().any(|p| p.name == **name))
            .map(|name| name.to_string())
            .collect();
        let mut missing: Vec<String> = self
            .params
            .iter()
            .filter(|p| p.required && !provided.contains(&p.name.as_str()))
            .map(|p| p.name.clone())
            .collect();
        extra.sort();
        missing.sort();
        (extra, missing)
    }
}

pub type TransformFn = dyn Fn(TransformArgs) -> Result<Value, TransformError> + Send + Sync;

/// A named, callable transform.
#[derive(Clone)]
pub struct Transform {
    name: String,
    signature: Signature,
    func: Arc<TransformFn>,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(TransformArgs) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        Transform {
            name: name.into(),
            signature,
            func: Arc::new(func),
        }
    }

    /// A transform of one value, exposed to keyword calls as `value`.
    pub fn unary<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        Transform::new(name, Signature::new().required("value"), move |args| {
            func(args.single("value"))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call_value(&self, value: Value) -> Result<Value, TransformError> {
        (self.func)(TransformArgs::Value(value))
    }

    pub fn call_keywords(&self, keywords: Map<String, Value>) -> Result<Value, TransformError> {
        (self.func)(TransformArgs::Keywords(keywords))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Name → transform table built from a spec's transform sources.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    entries: HashMap<String, Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        TransformRegistry::default()
    }

    /// Register `transform` under its own name, replacing any previous one.
    pub fn register(&mut self, transform: Transform) {
        self.entries.insert(transform.name.clone(), transform);
    }

    pub fn with(mut self, transform: Transform) -> Self {
        self.register(transform);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a registry from transform source files, in order. A name
    /// defined by several sources keeps the last definition.
    pub fn from_sources(
        paths: &[PathBuf],
        provider: &dyn SourceProvider,
    ) -> Result<Self, SpecError> {
        let mut registry = TransformRegistry::new();
        for path in paths {
            for transform in manifest::load_transform_source(path, provider)? {
                if registry.contains(transform.name()) {
                    log::debug!(
                        "transform '{}' redefined by {}",
                        transform.name(),
                        path.display()
                    );
                }
                registry.register(transform);
            }
        }
        Ok(registry)
    }
}

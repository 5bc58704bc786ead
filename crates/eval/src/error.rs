//! Error type for remapping, rule evaluation and map overlays.

use pvmap_core::{ParamError, SpecError, TransformError};
use serde_json::Value;
use std::path::PathBuf;

/// Coarse category of a [`RemapError`], stable across wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad spec, rule or map content.
    Configuration,
    /// A required input had no value.
    MissingValue,
    /// A parameter file could not be parsed.
    Parse,
    /// A transform raised an error.
    Transform,
}

#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    #[error("{message}")]
    Config { message: String },

    #[error("required input missing: '{input}'")]
    MissingRequired { input: String },

    #[error("unknown transform '{name}'")]
    UnknownTransform { name: String },

    #[error("transform '{name}' keyword mismatch: extra={extra:?} missing={missing:?}")]
    TransformSignature {
        name: String,
        extra: Vec<String>,
        missing: Vec<String>,
    },

    #[error("transform '{name}' failed: {source}")]
    Transform {
        name: String,
        #[source]
        source: TransformError,
    },

    /// A study-level remap referenced non-subject files, or no files at all.
    #[error("study remap only supports subject sources; found: {found:?}")]
    StudySources { found: Vec<String> },

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("rule '{name}' evaluation failed: {message}")]
    RuleEvaluation { name: String, message: String },

    #[error("map file not found: {}", path.display())]
    MapFileNotFound { path: PathBuf },

    /// Any failure while resolving one output key.
    #[error("error mapping '{key}' with rule {body}: {source}")]
    Rule {
        key: String,
        body: Value,
        #[source]
        source: Box<RemapError>,
    },
}

impl RemapError {
    pub fn config(message: impl Into<String>) -> Self {
        RemapError::Config {
            message: message.into(),
        }
    }

    /// Category of the error; wrapped errors report their inner category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemapError::MissingRequired { .. } => ErrorKind::MissingValue,
            RemapError::Transform { .. } => ErrorKind::Transform,
            RemapError::Param(_) => ErrorKind::Parse,
            RemapError::Rule { source, .. } => source.kind(),
            RemapError::Config { .. }
            | RemapError::UnknownTransform { .. }
            | RemapError::TransformSignature { .. }
            | RemapError::StudySources { .. }
            | RemapError::Spec(_)
            | RemapError::RuleEvaluation { .. }
            | RemapError::MapFileNotFound { .. } => ErrorKind::Configuration,
        }
    }

    /// The innermost error, looking through [`RemapError::Rule`] wrappers.
    pub fn root_cause(&self) -> &RemapError {
        match self {
            RemapError::Rule { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

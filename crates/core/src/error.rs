//! Error types for parameter parsing, spec loading and transforms.

use std::path::PathBuf;

/// Errors raised while turning parameter-file text into a [`crate::ParameterTable`].
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// The content contains no `##KEY=VALUE` line at all.
    #[error("not a parameter file: {origin}")]
    NotParameterFile { origin: String },

    /// A declared shape such as `( 3, x )` is not a list of integers.
    #[error("malformed shape '{shape}' for parameter '{key}'")]
    MalformedShape { key: String, shape: String },

    /// The element count does not fit the declared shape.
    #[error("cannot reshape {count} elements of '{key}' into {shape:?}")]
    ShapeMismatch {
        key: String,
        count: usize,
        shape: Vec<usize>,
    },

    #[error("cannot read parameter file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParamError {
    /// True when the error means "this is not a parameter file" rather than
    /// "this parameter file has malformed content".
    pub fn is_wrong_format(&self) -> bool {
        matches!(self, ParamError::NotParameterFile { .. })
    }
}

/// Configuration errors raised while loading specs, rule files, map files
/// and transform sources. These are never recovered from silently.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in '{}': {message}", path.display())]
    Yaml { path: PathBuf, message: String },

    #[error("spec file must be .yaml or .yml: {}", path.display())]
    BadSuffix { path: PathBuf },

    #[error("'{}' must contain a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    #[error("circular spec include: {chain}")]
    IncludeCycle { chain: String },

    #[error("cannot resolve include '{include}' from '{}': {source}", from.display())]
    UnresolvedInclude {
        include: String,
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `__meta__` field has the wrong type or value.
    #[error("invalid __meta__.{field} in '{}': {message}", path.display())]
    InvalidMeta {
        path: PathBuf,
        field: String,
        message: String,
    },

    #[error("spec include conflict for key '{key}' ('{}')", path.display())]
    IncludeConflict { key: String, path: PathBuf },

    #[error("invalid rule '{key}': {message}")]
    InvalidRule { key: String, message: String },

    #[error("unknown transform '{name}' referenced by '{key}'")]
    UnknownTransform { name: String, key: String },

    #[error("unknown builtin '{builtin}' for transform '{name}' in '{}'", path.display())]
    UnknownBuiltin {
        name: String,
        builtin: String,
        path: PathBuf,
    },

    #[error("invalid transform '{name}' in '{}': {message}", path.display())]
    InvalidTransformSource {
        name: String,
        path: PathBuf,
        message: String,
    },

    /// Aggregated schema violations for one document.
    #[error("{document} failed validation:\n  {}", errors.join("\n  "))]
    Validation {
        document: String,
        errors: Vec<String>,
    },
}

/// An error raised from inside a transform function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        TransformError {
            message: message.into(),
        }
    }
}

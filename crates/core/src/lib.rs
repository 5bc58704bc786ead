#![allow(clippy::result_large_err)]
//! pvmap-core: parameter-file parsing and remapping spec loading.
//!
//! Turns JCAMP-DX style scanner parameter files into typed tables and loads
//! the declarative YAML specs that remap them into structured metadata.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`ParameterTable`] / [`ParsedValue`] -- parsed parameter files
//! - [`Spec`] and its rule types -- typed remapping specs
//! - [`load_spec()`] / [`SpecCache`] -- include-aware spec loading
//! - [`TransformRegistry`] / [`Transform`] -- named transforms
//! - [`SourceProvider`] -- filesystem abstraction used by every loader
//! - [`ParamError`] / [`SpecError`] -- error types

pub mod config;
pub mod convert;
pub mod error;
pub mod jcamp;
pub mod json;
pub mod loader;
pub mod nested;
pub mod source;
pub mod spec;
pub mod transforms;
pub mod validate;
pub mod value;
pub mod yaml;

// ── Convenience re-exports: key types ────────────────────────────────

pub use config::{Config, ConfigPaths};
pub use error::{ParamError, SpecError, TransformError};
pub use jcamp::{LineKind, ParamEntry, ParameterTable};
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};
pub use spec::{
    InputMap, InputSpec, ParamFile, Rule, SourceDescriptor, SourceEntry, Spec, SpecEntry,
    SpecMeta, TransformChain,
};
pub use transforms::{Signature, Transform, TransformArgs, TransformRegistry};
pub use value::{Levels, Matrix, MatrixData, ParsedValue};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use loader::{load_spec, load_spec_with_provider, LoadOptions, LoadedSpec, SpecCache};
pub use validate::{validate_document, SchemaKind};

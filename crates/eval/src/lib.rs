#![allow(clippy::result_large_err)]
//! pvmap-eval: remaps scanner parameters into structured metadata.
//!
//! Takes a loaded [`pvmap_core::Spec`] and a [`ParameterSource`] (a scan
//! directory, a study, or tables in memory), resolves every output key,
//! and optionally applies a map overlay. Rule files select which spec a
//! scan should use.
//!
//! ```no_run
//! use pvmap_eval::{map_parameters, Scan};
//! use std::path::Path;
//!
//! let (spec, transforms) = pvmap_core::load_spec(Path::new("specs/metadata.yaml"))?;
//! let scan = Scan::open(Path::new("study/3"))?;
//! let metadata = map_parameters(&scan, &spec, &transforms)?;
//! println!("{}", metadata);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod overlay;
pub mod predicate;
pub mod remap;
pub mod rules;
pub mod scan;

pub use error::{ErrorKind, RemapError};
pub use overlay::{apply_map_overlay, load_map_file, MapDocument, MapRule};
pub use predicate::{BoolExpr, PredicateError};
pub use remap::{map_parameters, map_parameters_with, MapOptions};
pub use rules::{
    load_rules, load_rules_from, resolve_metadata_spec, resolve_spec_path, rule_matches,
    select_rule_use, RuleCategory, RuleEntry, RuleSet,
};
pub use scan::{ParameterMap, ParameterSource, Reco, Scan, SearchHit, Study};

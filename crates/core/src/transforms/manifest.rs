//! Transform source files.
//!
//! ```yaml
//! subject_label: strip
//! echo_time_s:
//!   builtin: scale
//!   with: { factor: 0.001 }
//! _draft: identity        # names starting with '_' are private
//! ```

use super::{builtin, Transform};
use crate::error::SpecError;
use crate::source::SourceProvider;
use crate::yaml::read_yaml;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryRepr {
    Name(String),
    Full(FullEntry),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FullEntry {
    builtin: String,
    #[serde(default, rename = "with")]
    options: Map<String, Value>,
}

/// Load the public transforms defined by one transform source file.
pub fn load_transform_source(
    path: &Path,
    provider: &dyn SourceProvider,
) -> Result<Vec<Transform>, SpecError> {
    let doc = match read_yaml(path, provider)? {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => {
            return Err(SpecError::NotAMapping {
                path: path.to_path_buf(),
            })
        }
    };

    let mut transforms = Vec::new();
    for (name, entry) in doc {
        if name.starts_with('_') {
            continue;
        }
        let entry: EntryRepr =
            serde_json::from_value(entry).map_err(|e| SpecError::InvalidTransformSource {
                name: name.clone(),
                path: path.to_path_buf(),
                message: format!("expected a builtin name or {{builtin, with}}: {}", e),
            })?;
        let (builtin_name, options) = match entry {
            EntryRepr::Name(b) => (b, Map::new()),
            EntryRepr::Full(full) => (full.builtin, full.options),
        };
        let transform = builtin::build(&builtin_name, &name, &options)
            .map_err(|message| SpecError::InvalidTransformSource {
                name: name.clone(),
                path: path.to_path_buf(),
                message,
            })?
            .ok_or_else(|| SpecError::UnknownBuiltin {
                name: name.clone(),
                builtin: builtin_name.clone(),
                path: path.to_path_buf(),
            })?;
        transforms.push(transform);
    }
    log::debug!(
        "loaded {} transform(s) from {}",
        transforms.len(),
        path.display()
    );
    Ok(transforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;
    use crate::transforms::TransformRegistry;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn loads_public_entries() {
        let provider = InMemoryProvider::default().with_file(
            "/t/common.yaml",
            "label: upper\nms_to_s:\n  builtin: scale\n  with: {factor: 0.5}\n_hidden: identity\n",
        );
        let transforms = load_transform_source(Path::new("/t/common.yaml"), &provider).unwrap();
        let names: Vec<&str> = transforms.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["label", "ms_to_s"]);
        assert_eq!(transforms[1].call_value(json!(20)).unwrap(), json!(10.0));
    }

    #[test]
    fn unknown_builtin_is_error() {
        let provider = InMemoryProvider::default().with_file("/t/bad.yaml", "x: frobnicate\n");
        let err = load_transform_source(Path::new("/t/bad.yaml"), &provider).unwrap_err();
        assert!(matches!(err, SpecError::UnknownBuiltin { ref builtin, .. } if builtin == "frobnicate"));
    }

    #[test]
    fn bad_options_are_error() {
        let provider = InMemoryProvider::default()
            .with_file("/t/bad.yaml", "x:\n  builtin: element\n  with: {index: first}\n");
        let err = load_transform_source(Path::new("/t/bad.yaml"), &provider).unwrap_err();
        assert!(matches!(err, SpecError::InvalidTransformSource { .. }));
    }

    #[test]
    fn later_sources_win() {
        let provider = InMemoryProvider::default()
            .with_file("/t/a.yaml", "norm: lower\n")
            .with_file("/t/b.yaml", "norm: upper\n");
        let registry = TransformRegistry::from_sources(
            &[PathBuf::from("/t/a.yaml"), PathBuf::from("/t/b.yaml")],
            &provider,
        )
        .unwrap();
        assert_eq!(
            registry.get("norm").unwrap().call_value(json!("Ab")).unwrap(),
            json!("AB")
        );
    }
}

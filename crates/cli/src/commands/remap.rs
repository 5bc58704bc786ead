use std::path::{Path, PathBuf};
use std::process;

use pvmap_core::{load_spec_with_provider, FileSystemProvider, LoadOptions};
use pvmap_eval::{map_parameters_with, MapOptions};

use super::open_source;
use crate::{print_json, report_error, OutputFormat, Settings};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_remap(
    path: &Path,
    spec: &Path,
    reco: Option<u32>,
    map_file: Option<&Path>,
    validate: bool,
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) {
    let spec_path = locate_spec(spec, &settings.paths.specs_dir);
    let provider = FileSystemProvider;
    let (spec, transforms) =
        match load_spec_with_provider(&spec_path, &provider, LoadOptions { validate }) {
            Ok(loaded) => loaded,
            Err(e) => {
                let msg = format!("error loading spec '{}': {}", spec_path.display(), e);
                report_error(&msg, output, quiet);
                process::exit(1);
            }
        };

    let source = match open_source(path, reco) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error reading '{}': {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    };

    let options = MapOptions {
        map_file,
        validate,
        provider: &provider,
    };
    match map_parameters_with(source.as_ref(), &spec, &transforms, &options) {
        Ok(metadata) => print_json(&metadata),
        Err(e) => {
            report_error(&format!("error remapping '{}': {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    }
}

/// An existing path as given, else the name under the installed specs
/// (with or without a `.yaml` suffix).
fn locate_spec(spec: &Path, specs_dir: &Path) -> PathBuf {
    if spec.is_file() || spec.is_absolute() {
        return spec.to_path_buf();
    }
    let installed = specs_dir.join(spec);
    if installed.is_file() {
        return installed;
    }
    let with_suffix = installed.with_extension("yaml");
    if with_suffix.is_file() {
        return with_suffix;
    }
    spec.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_spec_prefers_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("local.yaml");
        std::fs::write(&local, "").unwrap();
        assert_eq!(locate_spec(&local, Path::new("/nowhere")), local);
    }

    #[test]
    fn locate_spec_falls_back_to_installed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metadata.yaml"), "").unwrap();
        assert_eq!(
            locate_spec(Path::new("metadata"), dir.path()),
            dir.path().join("metadata.yaml")
        );
        assert_eq!(
            locate_spec(Path::new("missing.yaml"), dir.path()),
            PathBuf::from("missing.yaml")
        );
    }
}

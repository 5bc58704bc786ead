use std::path::Path;
use std::process;

use pvmap_core::{load_spec_with_provider, FileSystemProvider, LoadOptions, SpecError};
use serde_json::json;

use crate::{print_json, report_error, OutputFormat};

pub(crate) fn cmd_validate(spec_path: &Path, output: OutputFormat, quiet: bool) {
    let options = LoadOptions { validate: true };
    match load_spec_with_provider(spec_path, &FileSystemProvider, options) {
        Ok((spec, transforms)) => {
            if quiet {
                return;
            }
            match output {
                OutputFormat::Text => println!(
                    "valid ({} keys, {} transforms)",
                    spec.entries().len(),
                    transforms.names().len()
                ),
                OutputFormat::Json => print_json(&json!({
                    "valid": true,
                    "keys": spec.entries().iter().map(|e| e.key.as_str()).collect::<Vec<_>>(),
                    "transforms": transforms.names(),
                })),
            }
        }
        Err(SpecError::Validation { document, errors }) => {
            if !quiet {
                match output {
                    OutputFormat::Text => {
                        eprintln!(
                            "invalid: '{}' does not match the {} schema",
                            spec_path.display(),
                            document
                        );
                        for err in &errors {
                            eprintln!("  - {}", err);
                        }
                    }
                    OutputFormat::Json => {
                        print_json(&json!({ "valid": false, "errors": errors }));
                    }
                }
            }
            process::exit(1);
        }
        Err(e) => {
            report_error(&format!("error loading '{}': {}", spec_path.display(), e), output, quiet);
            process::exit(1);
        }
    }
}

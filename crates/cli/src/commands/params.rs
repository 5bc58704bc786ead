use std::path::Path;
use std::process;

use pvmap_core::{FileSystemProvider, ParameterTable};
use pvmap_eval::Scan;
use serde_json::{json, Map, Value};

use crate::{print_json, report_error, OutputFormat};

pub(crate) fn cmd_params(
    path: &Path,
    key: Option<&str>,
    search: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) {
    if path.is_dir() {
        match search {
            Some(query) => search_scan(path, query, output, quiet),
            None => {
                let msg = format!(
                    "'{}' is a directory; pass a parameter file or use --search",
                    path.display()
                );
                report_error(&msg, output, quiet);
                process::exit(1);
            }
        }
        return;
    }

    let table = match ParameterTable::load(path, &FileSystemProvider) {
        Ok(t) => t,
        Err(e) => {
            report_error(&format!("error parsing '{}': {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    };

    if let Some(key) = key {
        let Some(value) = table.get(key) else {
            let msg = format!("parameter '{}' not found in '{}'", key, path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        };
        match output {
            OutputFormat::Text => println!("{}", value.to_json()),
            OutputFormat::Json => print_json(&json!({ "key": key, "value": value.to_json() })),
        }
        return;
    }

    let values = match search {
        Some(query) => {
            let mut found = Map::new();
            for entry in table.search(query) {
                found.insert(entry.key.clone(), entry.value.to_json());
            }
            Value::Object(found)
        }
        None => table.to_json(),
    };
    match output {
        OutputFormat::Text => print_lines(&values),
        OutputFormat::Json => print_json(&values),
    }
}

fn search_scan(dir: &Path, query: &str, output: OutputFormat, quiet: bool) {
    let hits = Scan::open(dir).and_then(|scan| scan.search(query));
    let hits = match hits {
        Ok(h) => h,
        Err(e) => {
            report_error(&format!("error reading scan '{}': {}", dir.display(), e), output, quiet);
            process::exit(1);
        }
    };
    match output {
        OutputFormat::Text => {
            for hit in &hits {
                let file = match hit.reco_id {
                    Some(reco) => format!("{}[{}]", hit.file, reco),
                    None => hit.file.to_string(),
                };
                println!("{} {} = {}", file, hit.key, hit.value);
            }
        }
        OutputFormat::Json => print_json(&json!(hits)),
    }
}

fn print_lines(values: &Value) {
    if let Value::Object(map) = values {
        for (key, value) in map {
            println!("{} = {}", key, value);
        }
    }
}

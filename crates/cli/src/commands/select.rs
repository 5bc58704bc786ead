use std::path::Path;
use std::process;

use pvmap_core::{FileSystemProvider, LoadOptions};
use pvmap_eval::{load_rules_from, select_rule_use, RuleCategory};
use serde_json::json;

use super::open_source;
use crate::{print_json, report_error, OutputFormat, Settings};

pub(crate) fn cmd_select(
    path: &Path,
    category: &str,
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) {
    let Some(category) = RuleCategory::from_name(category) else {
        let names: Vec<&str> = RuleCategory::ALL.iter().map(|c| c.as_str()).collect();
        let msg = format!(
            "unknown rule category '{}' (expected one of: {})",
            category,
            names.join(", ")
        );
        report_error(&msg, output, quiet);
        process::exit(1);
    };

    let paths = &settings.paths;
    let rules = match load_rules_from(
        &paths.rules_dir,
        &paths.root,
        &FileSystemProvider,
        LoadOptions::default(),
    ) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("error loading rules from '{}': {}", paths.rules_dir.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let source = match open_source(path, None) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error reading '{}': {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    };

    let selected = match select_rule_use(source.as_ref(), rules.get(category)) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error evaluating rules: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match (output, selected) {
        (OutputFormat::Text, Some(rule)) => match &rule.spec_path {
            Some(spec_path) => println!("{} -> {} ({})", rule.name, rule.target, spec_path.display()),
            None => println!("{} -> {}", rule.name, rule.target),
        },
        (OutputFormat::Text, None) => {
            if !quiet {
                println!("no {} rule matched", category.as_str());
            }
        }
        (OutputFormat::Json, Some(rule)) => print_json(&json!({
            "category": category.as_str(),
            "name": rule.name,
            "use": rule.target,
            "spec_path": rule.spec_path,
        })),
        (OutputFormat::Json, None) => print_json(&json!({
            "category": category.as_str(),
            "name": null,
        })),
    }
}

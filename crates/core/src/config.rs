//! User configuration root.
//!
//! The root is `--root` when given, else `$PVMAP_CONFIG_HOME`, else
//! `~/.pvmap`. It holds an optional `config.yaml` and the installed
//! `specs/`, `rules/` and `transforms/` directories.

use crate::error::SpecError;
use crate::source::SourceProvider;
use crate::yaml::read_yaml;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_HOME: &str = "PVMAP_CONFIG_HOME";
pub const DEFAULT_DIRNAME: &str = ".pvmap";
pub const CONFIG_FILE: &str = "config.yaml";

/// Contents of `config.yaml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub output_width: usize,
    pub float_decimals: Option<u32>,
    pub specs_dir: PathBuf,
    pub rules_dir: PathBuf,
    pub transforms_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: None,
            output_width: 120,
            float_decimals: None,
            specs_dir: PathBuf::from("specs"),
            rules_dir: PathBuf::from("rules"),
            transforms_dir: PathBuf::from("transforms"),
        }
    }
}

impl Config {
    /// Load `<root>/config.yaml`. A missing or empty file gives defaults.
    pub fn load(root: &Path, provider: &dyn SourceProvider) -> Result<Config, SpecError> {
        let path = root.join(CONFIG_FILE);
        if !provider.is_file(&path) {
            return Ok(Config::default());
        }
        match read_yaml(&path, provider)? {
            Value::Null => Ok(Config::default()),
            doc @ Value::Object(_) => serde_json::from_value(doc).map_err(|e| SpecError::Yaml {
                path,
                message: e.to_string(),
            }),
            _ => Err(SpecError::NotAMapping { path }),
        }
    }

    /// `log` level filter for `log_level`, if one is set. Unknown names
    /// fall back to `Info`.
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level
            .as_deref()
            .map(|name| name.parse().unwrap_or(log::LevelFilter::Info))
    }
}

/// Resolved locations inside a configuration root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub specs_dir: PathBuf,
    pub rules_dir: PathBuf,
    pub transforms_dir: PathBuf,
}

impl ConfigPaths {
    /// Paths under `root`, with directory overrides from `config`.
    pub fn new(root: PathBuf, config: &Config) -> Self {
        let under = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { root.join(p) };
        ConfigPaths {
            config_file: root.join(CONFIG_FILE),
            specs_dir: under(&config.specs_dir),
            rules_dir: under(&config.rules_dir),
            transforms_dir: under(&config.transforms_dir),
            root,
        }
    }
}

/// Pick the configuration root: explicit, then environment, then home.
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(root) = explicit {
        return root.to_path_buf();
    }
    if let Some(env_root) = std::env::var_os(ENV_CONFIG_HOME).filter(|v| !v.is_empty()) {
        return PathBuf::from(env_root);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(DEFAULT_DIRNAME)
}

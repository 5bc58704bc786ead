mod commands;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use pvmap_core::{config, Config, ConfigPaths, FileSystemProvider};

use commands::params::cmd_params;
use commands::remap::cmd_remap;
use commands::select::cmd_select;
use commands::validate::cmd_validate;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Scanner parameter files to structured metadata.
#[derive(Parser)]
#[command(
    name = "pvmap",
    version,
    about = "Parse scanner parameter files and remap them into structured metadata"
)]
struct Cli {
    /// Configuration root (default: $PVMAP_CONFIG_HOME or ~/.pvmap)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log level (error, warn, info, debug, trace); overrides config.yaml
    #[arg(long, global = true)]
    log_level: Option<log::LevelFilter>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a parameter file and print its values as JSON
    Params {
        /// Parameter file, or a scan directory when used with --search
        file: PathBuf,
        /// Print a single parameter
        #[arg(long, conflicts_with = "search")]
        key: Option<String>,
        /// Print parameters whose name contains this text (case-insensitive)
        #[arg(long)]
        search: Option<String>,
    },

    /// Remap a scan (or a study's subject) through a spec
    Remap {
        /// Scan directory, or a study directory for subject-only specs
        path: PathBuf,
        /// Spec file; bare names are looked up in the installed specs
        #[arg(long)]
        spec: PathBuf,
        /// Reconstruction used for overlay conditions
        #[arg(long)]
        reco: Option<u32>,
        /// Map file overriding the spec's __meta__.map_file
        #[arg(long)]
        map_file: Option<PathBuf>,
        /// Schema-validate the spec and map file first
        #[arg(long)]
        validate: bool,
    },

    /// Select a spec for a scan using the installed rules
    Select {
        /// Scan or study directory
        path: PathBuf,
        /// Rule category to evaluate
        #[arg(long, default_value = "metadata_spec")]
        category: String,
    },

    /// Load a spec and validate it against the spec schema
    Validate {
        /// Spec file
        spec: PathBuf,
    },
}

/// Configuration root and the settings loaded from it.
pub(crate) struct Settings {
    pub(crate) config: Config,
    pub(crate) paths: ConfigPaths,
}

fn load_settings(root: Option<&Path>, output: OutputFormat, quiet: bool) -> Settings {
    let root = config::resolve_root(root);
    let config = match Config::load(&root, &FileSystemProvider) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error loading configuration: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let paths = ConfigPaths::new(root, &config);
    Settings { config, paths }
}

fn init_logging(explicit: Option<log::LevelFilter>, config: &Config) {
    let level = explicit
        .or_else(|| config.level_filter())
        .unwrap_or(log::LevelFilter::Warn);
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    let settings = load_settings(cli.root.as_deref(), cli.output, cli.quiet);
    init_logging(cli.log_level, &settings.config);
    log::debug!("configuration root {}", settings.paths.root.display());

    match cli.command {
        Commands::Params { file, key, search } => {
            cmd_params(
                &file,
                key.as_deref(),
                search.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Remap {
            path,
            spec,
            reco,
            map_file,
            validate,
        } => {
            cmd_remap(
                &path,
                &spec,
                reco,
                map_file.as_deref(),
                validate,
                &settings,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Select { path, category } => {
            cmd_select(&path, &category, &settings, cli.output, cli.quiet);
        }
        Commands::Validate { spec } => {
            cmd_validate(&spec, cli.output, cli.quiet);
        }
    }
}

/// Report an error in the requested output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print a JSON value to stdout, pretty-printed.
pub(crate) fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("error serializing output: {}", e);
            process::exit(1);
        }
    }
}

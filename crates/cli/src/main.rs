// RowLink CLI - config-driven record reconciliation

mod exit_codes;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_SUCCESS, EXIT_UNMATCHED};
use rowlink_engine::{load_csv_table, run, ReconcileConfig, Table};

#[derive(Parser)]
#[command(name = "rlink")]
#[command(about = "Rule-based reconciliation between two tabular datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  rlink run recon.toml
  rlink run recon.toml --json
  rlink run recon.toml --output result.json")]
    Run {
        /// Path to the .toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary only
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a config without running
    #[command(after_help = "\
Examples:
  rlink validate recon.toml")]
    Validate {
        /// Path to the .toml config file
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            eprintln!("Usage: rlink <command> [options]");
            eprintln!("       rlink --help for more information");
            Ok(())
        }
        Some(Commands::Run { config, json, output }) => cmd_run(config, json, output),
        Some(Commands::Validate { config }) => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // CSV paths resolve relative to the config file's directory.
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let left = load_side(base_dir, "left", config.left.file.as_deref())?;
    let right = load_side(base_dir, "right", config.right.file.as_deref())?;
    tracing::debug!(
        left_rows = left.rows.len(),
        right_rows = right.rows.len(),
        "tables loaded"
    );

    let result = run(&config, &left, &right).map_err(|e| CliError::runtime(e.to_string()))?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    let s = &result.summary;
    eprintln!(
        "recon '{}': {} matched ({:.1}%), {} unmatched left, {} unmatched right, {} warning(s), {}ms",
        result.meta.config_name,
        s.matched,
        s.match_rate_pct,
        s.unmatched_left,
        s.unmatched_right,
        s.warnings,
        s.elapsed_ms,
    );

    if s.unmatched_left > 0 || s.unmatched_right > 0 {
        return Err(CliError {
            code: EXIT_UNMATCHED,
            message: String::new(),
            hint: None,
        });
    }

    Ok(())
}

fn read_config(path: &Path) -> Result<ReconcileConfig, CliError> {
    let config_str = std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read config: {e}")))?;
    ReconcileConfig::from_toml(&config_str).map_err(|e| CliError::config(e.to_string()))
}

fn load_side(base_dir: &Path, side: &str, file: Option<&str>) -> Result<Table, CliError> {
    let file = file.ok_or_else(|| CliError {
        code: EXIT_INVALID_CONFIG,
        message: format!("{side} table has no file configured"),
        hint: Some(format!("set [{side}] file = \"data.csv\" in the config")),
    })?;
    let path = base_dir.join(file);
    let csv_data = std::fs::read_to_string(&path)
        .map_err(|e| CliError::runtime(format!("cannot read {}: {e}", path.display())))?;
    load_csv_table(side, &csv_data).map_err(|e| CliError::runtime(e.to_string()))
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: '{}', mode {}, {} rule(s), {} extract(s), {} filter(s)",
        config.name,
        config.mode,
        config.rules.len(),
        config.left.extract.len() + config.right.extract.len(),
        config.left.filter.len() + config.right.filter.len(),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

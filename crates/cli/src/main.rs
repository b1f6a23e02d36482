//! mr-conflict-checker command-line tool.
//!
//! Scans every GitLab project the configured token can see for open
//! `release` -> `master` merge requests that GitLab flags as conflicting, and
//! writes a markdown report. Also provides helpers for counting repositories,
//! checking connectivity, and generating / validating configuration files.

mod scan;
mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mr_conflict_core::config::SAMPLE_CONFIG;
use mr_conflict_core::{AppConfig, CancelSignal, GitLabClient, RepositoryScanner};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Find conflicting release -> master merge requests across GitLab.
#[derive(Parser, Debug)]
#[command(
    name = "mr-conflict-checker",
    version,
    about = "Report conflicting release -> master merge requests across a GitLab instance"
)]
struct Cli {
    /// Path to the YAML (or .toml) configuration file.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace-level logging.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Report directory when running the default scan.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan repositories and write a conflict report (default).
    Scan {
        /// Directory for the report. Overrides `output.directory`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print how many repositories a scan would visit.
    Count,

    /// Test the GitLab connection and token.
    Check,

    /// Validate a configuration file without contacting GitLab.
    Validate,

    /// Generate a sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise the flags pick the level.
fn init_tracing(verbose: bool, debug: bool) {
    let level = if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Init { output }) => cmd_init(&output),
        Some(Commands::Validate) => cmd_validate(&cli.config),
        Some(Commands::Count) => cmd_count(&cli.config).await,
        Some(Commands::Check) => cmd_check(&cli.config).await,
        Some(Commands::Scan { output }) => cmd_scan(&cli.config, output.or(cli.output)).await,
        None => cmd_scan(&cli.config, cli.output).await,
    }
}

// ---------------------------------------------------------------------------
// Config & client helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Build a client from config, cancelled by Ctrl+C / SIGTERM.
fn connect(config: &AppConfig) -> GitLabClient {
    let cancel = CancelSignal::new();
    signals::install(cancel.clone());

    GitLabClient::new(&config.gitlab.url, &config.gitlab.token)
        .with_request_interval(config.gitlab.request_interval())
        .with_timeout(config.gitlab.timeout())
        .with_cancellation(cancel)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_scan(config_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let client = connect(&config);
    scan::run_scan(&config, client, output).await
}

async fn cmd_count(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let client = connect(&config);

    let result = RepositoryScanner::new(&client, &config.gitlab.include_groups)
        .repository_count()
        .await;
    client.close().await;

    let count = result.context("failed to list repositories")?;
    println!("{count}");
    Ok(())
}

async fn cmd_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let client = connect(&config);

    let result = client.test_connection().await;
    client.close().await;

    match result {
        Ok(()) => {
            println!(
                "{}",
                style::success(&format!("Connected to {}", client.base_url()))
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", style::error(&format!("Connection to {} failed", client.base_url())));
            Err(e).context("GitLab connection test failed")
        }
    }
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, SAMPLE_CONFIG).context("failed to write config file")?;

    println!("{}", style::success(&format!("Sample configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set gitlab.url to your GitLab instance");
    println!("  2. Export GITLAB_TOKEN (or set gitlab.token) with a read_api token");
    println!(
        "  3. Validate with: mr-conflict-checker validate --config {}",
        output.display()
    );
    println!(
        "  4. Run a scan:    mr-conflict-checker scan --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] File structure is valid");

    config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let groups = if config.gitlab.include_groups.is_empty() {
        "all".to_string()
    } else {
        config
            .gitlab
            .include_groups
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!();
    println!("Configuration summary:");
    println!("  GitLab URL       : {}", config.gitlab.url);
    println!(
        "  Token            : {}",
        if config.gitlab.token.is_empty() {
            "NOT SET"
        } else {
            "set"
        }
    );
    println!("  Groups           : {}", groups);
    println!("  Request interval : {} ms", config.gitlab.request_interval_ms);
    println!("  Timeout          : {} s", config.gitlab.timeout_secs);
    println!(
        "  Output directory : {}",
        config
            .output
            .directory
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
            .display()
    );

    Ok(())
}

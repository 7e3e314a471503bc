//! xata-pg-migrate CLI - copy a Xata database into plain PostgreSQL.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use xata_pg_migrate::config::{SOURCE_URL_ENV, TARGET_URL_ENV};
use xata_pg_migrate::error::EXIT_CANCELLED;
use xata_pg_migrate::{
    health_check, Config, JsonProgress, LogProgress, MigrateError, Orchestrator, ProgressReporter,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "xata-pg-migrate")]
#[command(about = "Migrate a Xata database's public schema and data into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source (Xata) connection string
    #[arg(long, env = SOURCE_URL_ENV, hide_env_values = true)]
    source_url: Option<String>,

    /// Destination PostgreSQL connection string
    #[arg(long, env = TARGET_URL_ENV, hide_env_values = true)]
    target_url: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Dry run: introspect and show the DDL without writing to the destination
        #[arg(long)]
        dry_run: bool,

        /// Rows fetched from the source cursor per round trip
        #[arg(long)]
        fetch_size: Option<usize>,
    },

    /// Validate row counts between source and destination
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    // Variables already set in the environment win over the file.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    match dotenv {
        Ok(path) => debug!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => debug!("No .env file found, using the process environment"),
        Err(e) => warn!("Ignoring .env file: {}", e),
    }

    let mut config = match cli.config {
        Some(ref path) => {
            let config = Config::read_file(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    }
    .with_urls(cli.source_url.clone(), cli.target_url.clone());

    if let Commands::Run {
        fetch_size: Some(n),
        ..
    } = cli.command
    {
        config.migration.fetch_size = n;
    }

    config.validate()?;

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run { dry_run, .. } => {
            let progress: Box<dyn ProgressReporter> = if cli.progress {
                Box::new(JsonProgress::default())
            } else {
                Box::new(LogProgress::default())
            };

            let mut orchestrator = Orchestrator::connect(config).await?;
            let result = orchestrator
                .run(&cancel_token, progress.as_ref(), dry_run)
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if dry_run {
                    "Dry run completed!"
                } else {
                    "Migration completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables_total);
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
            }
        }

        Commands::Validate => {
            let mut orchestrator = Orchestrator::connect(config).await?;
            let report = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Validation Results:");
                for table in &report.tables {
                    println!(
                        "  {} {}: source={} target={}",
                        if table.matches { "OK      " } else { "MISMATCH" },
                        table.table,
                        table.source_rows,
                        table
                            .target_rows
                            .map_or_else(|| "missing".to_string(), |c| c.to_string())
                    );
                }
            }

            report.ensure_match()?;
            if !cli.output_json {
                println!("Validation completed successfully");
            }
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (Xata): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let endpoint = if result.source_connected { "target" } else { "source" };
                return Err(MigrateError::Connection {
                    endpoint: endpoint.to_string(),
                    message: "health check failed".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    // Logs go to stderr so stdout stays clean for --output-json.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the returned token on the first SIGINT or SIGTERM and exit
/// immediately on the next one.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        if token.is_cancelled() {
                            eprintln!("\nReceived {} again. Exiting now.", name);
                            std::process::exit(i32::from(EXIT_CANCELLED));
                        }
                        eprintln!(
                            "\nReceived {}. Stopping migration... (send again to exit now)",
                            name
                        );
                        token.cancel();
                    }
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Cancel the returned token on the first Ctrl-C and exit immediately on the
/// next one.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if token.is_cancelled() {
                eprintln!("\nReceived Ctrl-C again. Exiting now.");
                std::process::exit(i32::from(EXIT_CANCELLED));
            }
            eprintln!("\nReceived Ctrl-C. Stopping migration... (press again to exit now)");
            token.cancel();
        }
    });

    cancel_token
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use groundwork_core::{logging, Bootstrap, FailureKind, GroundworkConfig, ReadinessSignal, Runtime};

mod shutdown;

/// Groundwork - prepares data/, logs/ and the embedded store, then holds them for the service
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: groundwork.toml if present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Durable-storage directory
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Directory of <version>_<name>.sql migrations
    #[arg(long, value_name = "DIR", global = true)]
    migrations: Option<PathBuf>,

    /// Startup window in seconds
    #[arg(long, value_name = "SECS", global = true)]
    startup_timeout: Option<u64>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Bootstrap, then hold the store until SIGINT/SIGTERM (default)
    Run,

    /// Bootstrap and exit: 0 when ready, 1 otherwise
    Check,

    /// Bootstrap and print the layout and applied migrations
    Status {
        /// Output in JSON format for integrations
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("groundwork: {e}");
            return ExitCode::FAILURE;
        }
    };

    // File logging can only start once the log root is confirmed
    let guard = Arc::new(Mutex::new(None));
    let slot = guard.clone();
    let logging_settings = config.logging.clone();
    let verbose = cli.verbose;

    let signal = Bootstrap::new(config)
        .on_layout_ready(move |layout| {
            let worker = logging::init(&logging_settings, layout.log_root(), verbose)?;
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(worker);
            }
            Ok(())
        })
        .run()
        .await;

    let logging_up = guard.lock().map(|g| g.is_some()).unwrap_or(false);

    let runtime = match signal {
        ReadinessSignal::Ready(runtime) => runtime,
        ReadinessSignal::Failed(reason) => {
            // Once the subscriber is installed the bootstrap has already logged its own failures
            if !logging_up {
                eprintln!("groundwork: startup failed ({}): {}", reason.kind(), reason);
            } else if reason.kind() == FailureKind::Timeout {
                tracing::error!("Startup failed ({}): {}", reason.kind(), reason);
            }
            return ExitCode::FAILURE;
        }
    };

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => serve(runtime).await,
        Commands::Check => finish(runtime),
        Commands::Status { json } => status(runtime, json),
    };

    // Flush the non-blocking file writer before exit
    if let Ok(mut g) = guard.lock() {
        g.take();
    }
    code
}

fn resolve_config(cli: &Cli) -> anyhow::Result<GroundworkConfig> {
    let mut config = GroundworkConfig::load(cli.config.as_deref())?;

    if let Some(dir) = &cli.data_dir {
        config = config.with_storage_root(dir);
    }
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_root(dir);
    }
    if let Some(dir) = &cli.migrations {
        config = config.with_migrations_dir(dir);
    }
    if let Some(secs) = cli.startup_timeout {
        config = config.with_startup_timeout(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

async fn serve(runtime: Runtime) -> ExitCode {
    tracing::info!(
        "Service ready (pid {}), waiting for shutdown signal",
        std::process::id()
    );

    if let Err(e) = shutdown::wait_for_signal().await {
        tracing::error!("Failed to listen for shutdown signals: {}", e);
        release(runtime);
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown requested, releasing store");
    finish(runtime)
}

fn finish(runtime: Runtime) -> ExitCode {
    if release(runtime) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Close the store, logging a failure
fn release(runtime: Runtime) -> bool {
    match runtime.shutdown() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to close store: {}", e);
            false
        }
    }
}

fn status(runtime: Runtime, json: bool) -> ExitCode {
    let stats = match runtime.store().stats() {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Failed to read store status: {}", e);
            release(runtime);
            return ExitCode::FAILURE;
        }
    };

    let layout = runtime.layout();
    if json {
        let report = serde_json::json!({
            "storage_root": layout.storage_root().display().to_string(),
            "log_root": layout.log_root().display().to_string(),
            "store": stats,
        });
        println!("{}", report);
    } else {
        println!("STORAGE ROOT: {}", layout.storage_root().display());
        println!("LOG ROOT:     {}", layout.log_root().display());
        println!("STORE:        {}", layout.store_path().display());
        println!("JOURNAL MODE: {}", stats["journal_mode"].as_str().unwrap_or("?"));
        println!("SCHEMA:       v{}", stats["schema_version"]);
        if let Some(migrations) = stats["migrations"].as_array() {
            for m in migrations {
                println!("  - {} {}", m["version"], m["name"].as_str().unwrap_or(""));
            }
        }
    }

    finish(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_closes_store() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let runtime = groundwork_core::initialize(&data, tmp.path().join("logs"))
            .into_result()
            .unwrap();

        assert!(release(runtime));
        let entries: Vec<_> = std::fs::read_dir(&data).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_zero_startup_timeout_flag_rejected() {
        let cli = Cli::parse_from(["groundwork", "--startup-timeout", "0", "check"]);
        let err = resolve_config(&cli).unwrap_err();
        assert!(err.to_string().contains("startup_timeout_ms"));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "groundwork",
            "--data-dir",
            "/srv/state",
            "--startup-timeout",
            "7",
            "status",
            "--json",
        ]);
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.storage_root, PathBuf::from("/srv/state"));
        assert_eq!(config.startup_timeout(), Duration::from_secs(7));
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }
}

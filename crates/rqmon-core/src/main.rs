//! RQMon CLI
//!
//! Command-line interface for the Resque queue monitoring daemon.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn, Instrument};
use tracing_subscriber::EnvFilter;

use rqmon::alerting::{AlertEngine, Dispatcher};
use rqmon::db::{RedisMetricSource, RedisPool};
use rqmon::monitor::{daemon_span, Poller};
use rqmon::Config;

/// RQMon - Resque queue monitoring
#[derive(Parser)]
#[command(name = "rqmon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "RQMON_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append logs to this file instead of stdout
    #[arg(long, global = true, env = "RQMON_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring daemon
    Run,

    /// Poll both metric families once and print the alerts that would fire
    Check,

    /// Check connectivity to Redis
    Health,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RQMON__* settings may come from a .env file next to the daemon
    let _ = dotenvy::dotenv();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Keep the appender guard alive until exit so buffered lines are flushed
    let _log_guard = match init_logging(&config, cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Check => run_check(config).await,
        Commands::Health => run_health(config).await,
        Commands::Config => print_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `rqmon.toml` in the user's config directory, when it exists
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rqmon")
        .map(|dirs| dirs.config_dir().join("rqmon.toml"))
        .filter(|path| path.exists())
}

fn init_logging(
    config: &Config,
    verbose: bool,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = log_file
        .map(PathBuf::from)
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));

    let (writer, guard) = match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(guard)
}

fn connect(config: &Config) -> anyhow::Result<(RedisPool, Arc<RedisMetricSource>)> {
    let pool = RedisPool::new(&config.redis).context("failed to create Redis pool")?;
    let source = Arc::new(RedisMetricSource::new(&pool, config.redis.namespace.clone()));
    Ok((pool, source))
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    daemon(config).instrument(daemon_span()).await
}

async fn daemon(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        redis = %config.redacted().redis.url,
        namespace = %config.redis.namespace,
        "RQMon starting"
    );

    let (pool, source) = connect(&config)?;
    if let Err(e) = pool.health_check().await {
        // transient: the poll loops keep retrying every tick
        warn!(error = %e, "Redis not reachable at startup");
    }

    let dispatcher = Dispatcher::from_config(&config.notifications)
        .context("failed to set up notification channels")?;
    let engine = AlertEngine::from_config(&config);
    let poller = Poller::from_config(source, engine, &config.monitor).with_dispatcher(dispatcher);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { poller.run(shutdown_rx).await }.in_current_span());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down...");
    let _ = shutdown_tx.send(true);
    handle.await?;

    Ok(())
}

async fn run_check(config: Config) -> anyhow::Result<()> {
    let (_pool, source) = connect(&config)?;
    let engine = AlertEngine::from_config(&config);
    let poller = Poller::from_config(source, engine, &config.monitor);

    let queues = poller.poll_queues_once().await.context("queue poll failed")?;
    let failures = poller.poll_failures_once().await.context("failure poll failed")?;

    println!("Queues tracked:          {}", queues.tracked);
    println!("Failure classes tracked: {}", failures.tracked);

    let alerts: Vec<_> = queues.alerts.iter().chain(failures.alerts.iter()).collect();
    if alerts.is_empty() {
        println!("No alerts.");
    }
    for alert in alerts {
        println!("[{}] {}  {}", alert.kind, alert.message, alert.link);
    }

    Ok(())
}

async fn run_health(config: Config) -> anyhow::Result<()> {
    let (pool, _source) = connect(&config)?;
    pool.health_check().await.context("Redis health check failed")?;
    println!("Redis:  ok ({})", config.redis.url);
    Ok(())
}

fn print_config(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(&config.redacted())
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

use clap::Parser;
use sm_config::Config;
use sm_core::telemetry;
use sm_obs::{MetricRegistry, ObsState, ReadinessGate};
use sm_sched::{PollScheduler, SchedulerConfig};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;

/// Export follower counts of social media accounts as Prometheus metrics
#[derive(Debug, Parser)]
#[command(name = "smue", version, about)]
struct Cli {
    /// TOML configuration file; SMUE_* variables still take precedence
    #[arg(long, env = "SMUE_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Runtime environment, `production` switches logs to JSON
    #[arg(long, env = "SMUE_ENV", default_value = "development")]
    env: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    telemetry::init_tracing(&cli.env, sm_core::SERVICE_NAME);
    tracing::info!("smue starting");

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => {
            tracing::debug!(?config, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let registry = MetricRegistry::new();
    let adapters = sm_platform::build_adapters(&config, &registry).await;

    if adapters.is_empty() {
        tracing::warn!("No sources configured, only the poll counter will be exported");
    }

    let readiness = ReadinessGate::not_ready();
    let scheduler = match PollScheduler::new(
        adapters,
        SchedulerConfig {
            interval: config.interval(),
            parallel: config.parallel_fetch,
        },
        &registry,
        &config.metrics_prefix,
    ) {
        Ok(scheduler) => scheduler.with_readiness(readiness.clone()),
        Err(e) => {
            tracing::error!("Failed to set up poll scheduler: {}", e);
            process::exit(1);
        }
    };

    tracing::info!(
        bind_addr = %config.bind_addr(),
        path = %config.scrape_route(),
        interval_secs = config.interval_seconds,
        adapters = scheduler.adapter_count(),
        "Exporter configured"
    );

    let shutdown = CancellationToken::new();
    let poller = scheduler.spawn(shutdown.clone());

    let obs_state = ObsState::new(registry)
        .with_scrape_path(&config.http_path)
        .with_readiness(readiness);
    let bind_addr = config.bind_addr();

    let result = tokio::select! {
        server_result = sm_obs::start_server(&bind_addr, obs_state) => {
            tracing::info!("Exporter server exited");
            server_result
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    shutdown.cancel();
    if let Err(e) = poller.await {
        tracing::error!("Poll scheduler task failed: {}", e);
    }

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }

    tracing::info!("smue stopped");
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

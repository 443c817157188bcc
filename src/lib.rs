pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod extractors;
pub mod matcher;
pub mod metadata;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
pub use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use services::{Scheduler, WorkerPool};
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    if matches!(command, Commands::Init) {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Edit config.toml and run again.");
        } else {
            println!("Config file already exists.");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = init_observability(&config)?;

    let (state, information_task) = SharedState::new(config).await?;

    let result = match command {
        Commands::Daemon => run_daemon(state, prometheus_handle).await,
        Commands::Refetch => cli::cmd_refetch(&state).await,
        Commands::Resync { ids } => cli::cmd_resync(&state, ids).await,
        Commands::Fetch { anilist_id, force } => cli::cmd_fetch(&state, anilist_id, force).await,
        Commands::Relations { anime_ids } => cli::cmd_relations(&state, anime_ids).await,
        Commands::Scrape {
            anime_ids,
            info_only,
        } => {
            state.seed_websites().await?;
            cli::cmd_scrape(&state, anime_ids, info_only).await
        }
        Commands::Source { id } => cli::cmd_source(&state, &id).await,
        Commands::Run { task } => {
            state.seed_websites().await?;
            cli::cmd_run_task(&state, &task).await
        }
        Commands::Queue => cli::cmd_queue(&state).await,
        Commands::Info { id } => cli::cmd_anime_info(&state, &id).await,
        Commands::Init => Ok(()),
    };

    information_task.abort();
    result
}

/// Installs the tracing subscriber and, when enabled, the Prometheus recorder.
fn init_observability(config: &Config) -> anyhow::Result<Option<PrometheusHandle>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let mut log_level = config.general.log_level.clone();
    if config.general.suppress_connection_errors {
        log_level.push_str(",reqwest::retry=off,hyper_util=off");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder().label("app", "anisync")?;
        for (key, value) in &config.observability.loki_labels {
            if key != "app" {
                builder = builder.label(key.as_str(), value.as_str())?;
            }
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");
    Ok(Some(handle))
}

async fn run_daemon(
    state: SharedState,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "anisync v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let config = state.config().await;

    state.seed_websites().await?;
    state.queue.recover().await?;

    let workers = WorkerPool::new(Arc::clone(&state.queue), state.job_router());
    let worker_handles = workers.start().await;

    let scheduler = Arc::new(Scheduler::new(
        state.dispatcher.clone(),
        config.scheduler.clone(),
    ));
    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    let server_handle = if config.server.enabled {
        let port = config.server.port;
        info!("Starting admin API on port {}", port);

        let app_state = api::create_app_state(Arc::new(state.clone()), prometheus_handle);
        let app = api::router(app_state).await;
        let addr = format!("0.0.0.0:{port}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("Admin API running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }

    scheduler.stop().await;
    workers.stop().await;

    // In-flight jobs finish their current anime; anything left running is
    // recovered on the next start.
    for handle in worker_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(30), handle).await;
    }
    let _ = scheduler_handle.await;
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Daemon stopped");

    Ok(())
}

// Entry point for every pipeline role:
// - serve: control API over the supervisor, merge and backfill
// - listen: the feed listener worker (spawned by the supervisor)
// - start / stop / status: supervisor from the command line
// - merge / backfill: one-shot batch jobs

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tx_graph_ingest::{
    api, config::Config, db, pipeline, state::AppState, store, FeedListener, MasterStore,
    StagingLog, Supervisor,
};

#[derive(Parser)]
#[command(name = "tx-graph-ingest", about = "Transaction ingestion into a property graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve,
    /// Run the feed listener in the foreground
    Listen,
    /// Start the listener as a background worker
    Start,
    /// Stop the background worker and merge what it staged
    Stop,
    /// Report whether the background worker is running
    Status,
    /// Merge the staging log into the master store
    Merge,
    /// Reconcile confirmations, then re-materialize the master store into the graph
    Backfill,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::Listen => listen(config).await?,
        Command::Start => {
            let outcome = Supervisor::from_config(&config)?.start().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Stop => {
            let outcome = Supervisor::from_config(&config)?.stop().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Status => {
            let status = Supervisor::from_config(&config)?.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Merge => {
            let staging = StagingLog::new(&config.staging_path);
            let master = MasterStore::new(&config.master_path, config.master_on_corrupt);
            let report = store::merge(&staging, &master).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Backfill => {
            let db_pool = db::connection::establish_connection(&config.database_url).await?;
            let report = pipeline::run_backfill(&config, &db_pool).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting control API");

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    let supervisor = Supervisor::from_config(&config)?;
    let addr = format!("{}:{}", config.server_host, config.server_port);

    let app_state = Arc::new(AppState {
        config,
        db_pool,
        supervisor: Arc::new(Mutex::new(supervisor)),
    });

    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn listen(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting real-time transaction ingestion");

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    let listener = FeedListener::from_config(&config, db_pool);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let stats = listener.run(shutdown).await?;
    info!(
        "Listener exited after staging {} of {} messages",
        stats.staged, stats.received
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

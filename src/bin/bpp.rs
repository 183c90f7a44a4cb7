use beckn::{
    config::AppConfig,
    model::SupportInfo,
    server::bpp_router,
    ActionDispatcher, HttpCallbackSink, InMemoryStore, SqliteStore, Store, WorkerPool,
};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "bpp")]
#[command(about = "Provider platform serving search and order-lifecycle actions")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Overrides `database.url`; use `memory` for a process-local store
    #[arg(short, long)]
    database_url: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load_with_env_overrides(&args.config)?;
    if let Some(database_url) = args.database_url {
        config.database.url = database_url;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;
    config.logging.init_tracing();

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; orders are lost on restart");
        Arc::new(InMemoryStore::new())
    } else {
        Arc::new(SqliteStore::connect(&config.database).await?)
    };

    let callbacks = Arc::new(HttpCallbackSink::new(config.callback.timeout())?);
    let workers = Arc::new(WorkerPool::new());
    let dispatcher = Arc::new(ActionDispatcher::new(
        store,
        callbacks,
        workers.clone(),
        SupportInfo::from(&config.support),
    ));

    let app = bpp_router(dispatcher);
    let listener = TcpListener::bind(config.get_server_address()).await?;
    tracing::info!("BPP listening on {}", config.get_server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = workers.drain(config.dispatcher.drain_timeout()).await;
    tracing::info!(
        "BPP shut down ({} callbacks flushed, {} aborted)",
        report.completed,
        report.aborted
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

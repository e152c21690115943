use std::sync::Arc;

use clap::Parser;
use loopmock::backend::{BackendSelector, RuntimeContext};
use loopmock::config::Config;
use loopmock::metrics;
use loopmock::persist::MemoryStore;
use loopmock::server::ListenerShell;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::parse();
    metrics::register_process_metrics();

    let routes = config.load_routes()?;

    let shell = Arc::new(ListenerShell::new());
    let selector = BackendSelector::new(RuntimeContext {
        native: Some(shell.clone()),
        agent_host: None,
        store: Arc::new(MemoryStore::new()),
    });
    let backend = selector.get();

    backend.start(config.port, routes.into_inner()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    config.save_routes(&shell.routes().await)?;
    backend.stop().await?;
    Ok(())
}

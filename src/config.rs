use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::error::Result;
use crate::models::{DEFAULT_PORT, MockRoute};
use crate::store::RouteStore;

#[derive(Debug, Clone, Parser)]
#[command(name = "loopmock", about = "Local mock HTTP server with OpenAPI import")]
pub struct Config {
    /// Port to listen on (127.0.0.1 only).
    #[arg(short, long, env = "LOOPMOCK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// JSON file holding a route array. A missing file means no routes.
    #[arg(long, env = "LOOPMOCK_ROUTES")]
    pub routes: Option<PathBuf>,

    /// OpenAPI 3.x document (JSON or YAML) merged after the route file.
    #[arg(long, env = "LOOPMOCK_OPENAPI")]
    pub openapi: Option<PathBuf>,

    /// Write the live route table back to the route file on shutdown.
    #[arg(long, env = "LOOPMOCK_SAVE", requires = "routes")]
    pub save: bool,
}

impl Config {
    pub fn load_routes(&self) -> Result<RouteStore> {
        let mut store = RouteStore::default();

        if let Some(path) = &self.routes {
            if path.exists() {
                let content = fs::read_to_string(path)?;
                let added = store.import_json(&content)?;
                tracing::info!("Loaded {} routes from {}", added, path.display());
            } else {
                tracing::warn!("Route file {} not found, starting empty", path.display());
            }
        }

        if let Some(path) = &self.openapi {
            let content = fs::read_to_string(path)?;
            let outcome = store.import_openapi(&content)?;
            tracing::info!(
                "Added {} of {} routes from {}",
                outcome.added,
                outcome.compiled,
                path.display()
            );
        }

        Ok(store)
    }

    pub fn save_routes(&self, routes: &[MockRoute]) -> Result<()> {
        if let (true, Some(path)) = (self.save, &self.routes) {
            let content = serde_json::to_string_pretty(routes)
                .map_err(|e| crate::Error::Persist(e.to_string()))?;
            fs::write(path, content)?;
            tracing::info!("Saved {} routes to {}", routes.len(), path.display());
        }
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::MockServerBackend;
use crate::agent::{AgentEvent, AgentHandle, AgentHost, AgentMessage};
use crate::error::{Error, Result};
use crate::models::{MockRoute, MockServerStatus};
use crate::persist::StateStore;

pub const ROUTES_KEY: &str = "loopmock_mock_routes";
pub const STATUS_KEY: &str = "loopmock_mock_server_status";
pub const AGENT_SCRIPT: &str = "/mock-service-worker.js";
pub const AGENT_SCOPE: &str = "/";

/// Browser-mode backend: persisted record plus an interception agent.
///
/// `status()` reports the persisted record only. If a message to the agent
/// is lost the two can disagree; nothing here detects that.
pub struct BrowserBackend {
    store: Arc<dyn StateStore>,
    host: Option<Arc<dyn AgentHost>>,
}

impl BrowserBackend {
    pub fn new(store: Arc<dyn StateStore>, host: Option<Arc<dyn AgentHost>>) -> Self {
        Self { store, host }
    }

    fn host(&self) -> Result<&Arc<dyn AgentHost>> {
        self.host.as_ref().ok_or(Error::AgentUnsupported)
    }

    /// Persisted routes. Entries that no longer parse are skipped one by
    /// one so a single bad record cannot empty the list.
    pub fn load_routes(&self) -> Vec<MockRoute> {
        let Some(raw) = self.store.get(ROUTES_KEY) else {
            return Vec::new();
        };
        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored routes: {}", e);
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                serde_json::from_value(entry)
                    .inspect_err(|e| tracing::warn!("Skipping stored route {}: {}", index, e))
                    .ok()
            })
            .collect()
    }

    pub fn load_status(&self) -> MockServerStatus {
        self.store
            .get(STATUS_KEY)
            .and_then(|raw| {
                serde_json::from_str(&raw)
                    .inspect_err(|e| tracing::warn!("Ignoring unreadable stored status: {}", e))
                    .ok()
            })
            .unwrap_or_default()
    }

    async fn save_routes(&self, routes: &[MockRoute]) -> Result<()> {
        let raw = serde_json::to_string(routes).map_err(|e| Error::Persist(e.to_string()))?;
        self.store.set(ROUTES_KEY, raw)?;
        self.post(AgentMessage::UpdateRoutes {
            routes: routes.to_vec(),
        })
        .await
    }

    async fn save_status(&self, status: MockServerStatus) -> Result<()> {
        let raw = serde_json::to_string(&status).map_err(|e| Error::Persist(e.to_string()))?;
        self.store.set(STATUS_KEY, raw)?;
        self.post(AgentMessage::UpdateStatus { status }).await
    }

    /// Sends `message` to the active agent, else the waiting one. Without a
    /// registration the message is dropped.
    async fn post(&self, message: AgentMessage) -> Result<()> {
        let Some(host) = self.host.as_ref() else {
            return Ok(());
        };
        let Some(registration) = host.registration().await else {
            tracing::debug!("No agent registered, message dropped");
            return Ok(());
        };
        match registration.message_target() {
            Some(agent) => agent.post_message(message),
            None => {
                tracing::debug!("No active or waiting agent, message dropped");
                Ok(())
            }
        }
    }

    /// Registers the agent if needed and waits until one is active. A
    /// waiting agent is promoted instead of left next to the active one.
    pub async fn ensure_agent(&self) -> Result<()> {
        let host = self.host()?;
        let registration = host
            .register(AGENT_SCRIPT, AGENT_SCOPE)
            .await
            .map_err(|e| match e {
                Error::AgentInstall(_) | Error::AgentUnsupported => e,
                other => Error::AgentInstall(other.to_string()),
            })?;

        if let Some(waiting) = &registration.waiting {
            return Self::promote(waiting).await;
        }
        match (&registration.active, &registration.installing) {
            (None, Some(installing)) => installing.activated().await,
            (Some(_), Some(installing)) => {
                // An update next to the active agent lands in waiting.
                installing.installed().await?;
                let waiting = host.registration().await.and_then(|r| r.waiting);
                match waiting {
                    Some(waiting) => Self::promote(&waiting).await,
                    None => Ok(()),
                }
            }
            (Some(_), None) => Ok(()),
            (None, None) => Err(Error::AgentInstall(
                "registration holds no agent".to_string(),
            )),
        }
    }

    async fn promote(waiting: &AgentHandle) -> Result<()> {
        tracing::info!("Promoting waiting agent {}", waiting.version());
        waiting.post_message(AgentMessage::SkipWaiting)?;
        waiting.activated().await
    }

    /// Pushes the persisted routes and status to the agent in one message.
    pub async fn resync(&self) -> Result<()> {
        self.post(AgentMessage::SyncData {
            routes: self.load_routes(),
            status: self.load_status(),
        })
        .await
    }

    /// Answers every agent `RequestSync` with [`resync`](Self::resync).
    pub fn spawn_sync_responder(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut events = self.host()?.events();
        let backend = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AgentEvent::RequestSync) | Err(RecvError::Lagged(_)) => {
                        tracing::debug!("Agent requested sync");
                        if let Err(e) = backend.resync().await {
                            tracing::warn!("Resync failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[async_trait]
impl MockServerBackend for BrowserBackend {
    async fn start(&self, port: u16, routes: Vec<MockRoute>) -> Result<()> {
        if let Err(e) = self.ensure_agent().await {
            tracing::error!("Failed to start web mock server: {}", e);
            return Err(e);
        }
        self.save_routes(&routes).await?;
        self.save_status(MockServerStatus::running(port)).await?;
        self.resync().await?;
        tracing::info!("Mock server intercepting localhost:{} ({} routes)", port, routes.len());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let port = self.load_status().port;
        self.save_status(MockServerStatus::stopped(port)).await?;
        self.resync().await?;
        tracing::info!("Mock server stopped");
        Ok(())
    }

    async fn add_route(&self, route: MockRoute) -> Result<()> {
        let mut routes = self.load_routes();
        routes.push(route);
        self.ensure_agent().await?;
        self.save_routes(&routes).await?;
        self.resync().await
    }

    async fn status(&self) -> Result<MockServerStatus> {
        Ok(self.load_status())
    }
}

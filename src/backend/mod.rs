//! The two interception backends behind one interface, chosen once per
//! process from the capabilities the runtime actually has.

mod browser;
mod native;

pub use browser::{AGENT_SCOPE, AGENT_SCRIPT, BrowserBackend, ROUTES_KEY, STATUS_KEY};
pub use native::{NativeBackend, NativeShell};

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::agent::AgentHost;
use crate::error::Result;
use crate::models::{MockRoute, MockServerStatus};
use crate::persist::StateStore;

#[async_trait]
pub trait MockServerBackend: Send + Sync {
    async fn start(&self, port: u16, routes: Vec<MockRoute>) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn add_route(&self, route: MockRoute) -> Result<()>;
    async fn status(&self) -> Result<MockServerStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Browser,
}

/// Capabilities present in the current process.
#[derive(Clone)]
pub struct RuntimeContext {
    pub native: Option<Arc<dyn NativeShell>>,
    pub agent_host: Option<Arc<dyn AgentHost>>,
    pub store: Arc<dyn StateStore>,
}

impl RuntimeContext {
    pub fn kind(&self) -> BackendKind {
        if self.native.is_some() {
            BackendKind::Native
        } else {
            BackendKind::Browser
        }
    }
}

pub fn build_backend(ctx: &RuntimeContext) -> Arc<dyn MockServerBackend> {
    match ctx.kind() {
        BackendKind::Native => Arc::new(NativeBackend::new(ctx.native.clone())),
        BackendKind::Browser => {
            let backend = Arc::new(BrowserBackend::new(
                ctx.store.clone(),
                ctx.agent_host.clone(),
            ));
            // Outside a runtime there is nobody to answer sync requests yet.
            if tokio::runtime::Handle::try_current().is_ok()
                && let Err(e) = backend.spawn_sync_responder()
            {
                tracing::debug!("No agent sync responder: {}", e);
            }
            backend
        }
    }
}

/// Builds the backend on first use and hands out the same one afterwards.
pub struct BackendSelector {
    ctx: RuntimeContext,
    backend: OnceLock<Arc<dyn MockServerBackend>>,
}

impl BackendSelector {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            backend: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.ctx.kind()
    }

    pub fn get(&self) -> Arc<dyn MockServerBackend> {
        self.backend
            .get_or_init(|| {
                tracing::info!("Using {:?} mock server backend", self.ctx.kind());
                build_backend(&self.ctx)
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LocalAgentHost;
    use crate::persist::MemoryStore;

    #[test]
    fn browser_is_chosen_without_native_shell() {
        let ctx = RuntimeContext {
            native: None,
            agent_host: Some(Arc::new(LocalAgentHost::new("v1"))),
            store: Arc::new(MemoryStore::new()),
        };
        let selector = BackendSelector::new(ctx);
        assert_eq!(selector.kind(), BackendKind::Browser);
        assert!(Arc::ptr_eq(&selector.get(), &selector.get()));
    }

    #[tokio::test]
    async fn browser_backend_resyncs_agents_activated_later() {
        let host = Arc::new(LocalAgentHost::new("v1"));
        let store = Arc::new(MemoryStore::new());
        store
            .set(STATUS_KEY, r#"{"running":true,"port":3000}"#.to_string())
            .unwrap();
        let selector = BackendSelector::new(RuntimeContext {
            native: None,
            agent_host: Some(host.clone()),
            store,
        });
        let _backend = selector.get();

        host.register(AGENT_SCRIPT, AGENT_SCOPE)
            .await
            .unwrap()
            .installing
            .unwrap()
            .activated()
            .await
            .unwrap();
        for _ in 0..100 {
            if host.active_agent().is_some_and(|a| a.state().status().running) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("agent never received the persisted status");
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;

use super::protocol::{AgentMessage, InterceptedRequest};
use crate::error::{Error, Result};
use crate::matcher;
use crate::models::{MockRoute, MockServerStatus};
use crate::responder::{self, MockResponse};

/// State owned by one agent instance.
///
/// Created defaulted when the agent starts (no routes, not running, port
/// 3000) and replaced only through [`AgentMessage`]s. It lives as long as the
/// agent; durability belongs to the page-side persisted record.
#[derive(Debug)]
pub struct AgentState {
    routes: ArcSwap<Vec<MockRoute>>,
    status: ArcSwap<MockServerStatus>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
            status: ArcSwap::from_pointee(MockServerStatus::default()),
        }
    }
}

impl AgentState {
    pub fn routes(&self) -> Arc<Vec<MockRoute>> {
        self.routes.load_full()
    }

    pub fn status(&self) -> MockServerStatus {
        **self.status.load()
    }

    pub fn apply(&self, message: &AgentMessage) {
        match message {
            AgentMessage::UpdateRoutes { routes } => {
                self.routes.store(Arc::new(routes.clone()));
            }
            AgentMessage::UpdateStatus { status } => {
                self.status.store(Arc::new(*status));
            }
            AgentMessage::SyncData { routes, status } => {
                self.routes.store(Arc::new(routes.clone()));
                self.status.store(Arc::new(*status));
            }
            AgentMessage::SkipWaiting => {}
        }
    }
}

pub enum FetchDisposition {
    /// Not ours; the request goes to the network unmodified.
    PassThrough,
    Respond(PendingResponse),
}

impl FetchDisposition {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, FetchDisposition::PassThrough)
    }

    pub fn into_pending(self) -> Option<PendingResponse> {
        match self {
            FetchDisposition::PassThrough => None,
            FetchDisposition::Respond(pending) => Some(pending),
        }
    }
}

/// A mock response on its way. Delayed responses run on their own detached
/// task: dropping this value, stopping the server or deleting the route
/// does not cancel them.
pub struct PendingResponse {
    inner: Pending,
}

enum Pending {
    Ready(Option<MockResponse>),
    Delayed(JoinHandle<MockResponse>),
}

impl PendingResponse {
    fn ready(response: MockResponse) -> Self {
        Self {
            inner: Pending::Ready(Some(response)),
        }
    }

    fn delayed(route: MockRoute) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(route.delay_ms)).await;
            responder::respond(&route)
        });
        Self {
            inner: Pending::Delayed(handle),
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<MockResponse>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Pending::Ready(response) => Poll::Ready(
                response
                    .take()
                    .ok_or_else(|| Error::Agent("response already taken".to_string())),
            ),
            Pending::Delayed(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.map_err(|e| Error::Agent(e.to_string()))),
        }
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// The request-answering half of an agent.
#[derive(Debug)]
pub struct InterceptionAgent {
    version: String,
    state: Arc<AgentState>,
}

impl InterceptionAgent {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: Arc::new(AgentState::default()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.state
    }

    pub fn handle_message(&self, message: &AgentMessage) {
        tracing::debug!(agent = %self.version, "Applying {}", message_kind(message));
        self.state.apply(message);
    }

    /// Decides whether to answer `request` and, if so, with what.
    ///
    /// Matched routes with a delay spawn a task, so this must run inside a
    /// tokio runtime.
    pub fn handle_fetch(&self, request: &InterceptedRequest) -> FetchDisposition {
        let status = self.state.status();
        if !status.running {
            return FetchDisposition::PassThrough;
        }

        if !request.host().is_some_and(is_loopback) {
            return FetchDisposition::PassThrough;
        }

        // Default-port requests reach the matcher even when another port is
        // configured.
        let port = request.effective_port();
        if port != status.port && port != 80 {
            tracing::trace!("Port {} is not {}, passing through", port, status.port);
            return FetchDisposition::PassThrough;
        }

        let method = request.method.as_str();
        let path = request.path();
        let routes = self.state.routes();

        match matcher::find_route(&routes, method, path) {
            Some(route) if route.delay_ms > 0 => {
                tracing::debug!("Matched {} {} (delayed {}ms)", method, path, route.delay_ms);
                FetchDisposition::Respond(PendingResponse::delayed(route.clone()))
            }
            Some(route) => {
                tracing::debug!("Matched {} {}", method, path);
                FetchDisposition::Respond(PendingResponse::ready(responder::respond(route)))
            }
            None => {
                tracing::warn!("No mock route for {} {}", method, path);
                FetchDisposition::Respond(PendingResponse::ready(responder::not_found(
                    method, path,
                )))
            }
        }
    }
}

fn message_kind(message: &AgentMessage) -> &'static str {
    match message {
        AgentMessage::UpdateRoutes { .. } => "UPDATE_ROUTES",
        AgentMessage::UpdateStatus { .. } => "UPDATE_STATUS",
        AgentMessage::SyncData { .. } => "SYNC_DATA",
        AgentMessage::SkipWaiting => "SKIP_WAITING",
    }
}

//! Agent installation and lifecycle.
//!
//! An [`AgentHost`] owns at most one registration, which can hold an
//! installing, a waiting and an active agent at the same time. A newly
//! installed agent activates immediately when nothing is active; otherwise it
//! waits until it receives [`AgentMessage::SkipWaiting`]. Every activation
//! broadcasts [`AgentEvent::RequestSync`] so the page re-pushes its state into
//! the freshly defaulted agent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use super::interceptor::{FetchDisposition, InterceptionAgent};
use super::protocol::{AgentEvent, AgentMessage, InterceptedRequest};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLifecycle {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Page-side handle to one agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: u64,
    version: String,
    lifecycle: watch::Receiver<AgentLifecycle>,
    inbox: mpsc::UnboundedSender<AgentMessage>,
}

impl AgentHandle {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn lifecycle(&self) -> AgentLifecycle {
        *self.lifecycle.borrow()
    }

    pub fn post_message(&self, message: AgentMessage) -> Result<()> {
        self.inbox
            .send(message)
            .map_err(|_| Error::Agent(format!("agent {} is gone", self.version)))
    }

    /// Resolves once installation finished, whether the agent then waits or
    /// activates. Fails if it is superseded first.
    pub async fn installed(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        let state = *lifecycle
            .wait_for(|s| *s != AgentLifecycle::Installing)
            .await
            .map_err(|_| Error::AgentInstall(format!("agent {} vanished", self.version)))?;
        if state == AgentLifecycle::Redundant {
            return Err(Error::AgentInstall(format!(
                "agent {} was superseded while installing",
                self.version
            )));
        }
        Ok(())
    }

    /// Resolves once the agent is activated; fails if it is replaced first.
    pub async fn activated(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        let state = *lifecycle
            .wait_for(|s| matches!(s, AgentLifecycle::Activated | AgentLifecycle::Redundant))
            .await
            .map_err(|_| Error::AgentInstall(format!("agent {} vanished", self.version)))?;
        match state {
            AgentLifecycle::Activated => Ok(()),
            _ => Err(Error::AgentInstall(format!(
                "agent {} became redundant before activating",
                self.version
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentRegistration {
    pub active: Option<AgentHandle>,
    pub waiting: Option<AgentHandle>,
    pub installing: Option<AgentHandle>,
}

impl AgentRegistration {
    /// Where page messages go: the active agent, else the waiting one.
    pub fn message_target(&self) -> Option<&AgentHandle> {
        self.active.as_ref().or(self.waiting.as_ref())
    }
}

#[async_trait]
pub trait AgentHost: Send + Sync {
    /// Existing registration, installing `script` at `scope` when there is
    /// none. Idempotent.
    async fn register(&self, script: &str, scope: &str) -> Result<AgentRegistration>;

    /// Existing registration without installing anything.
    async fn registration(&self) -> Option<AgentRegistration>;

    /// Agent → page event stream.
    fn events(&self) -> broadcast::Receiver<AgentEvent>;
}

#[derive(Clone)]
struct Worker {
    agent: Arc<InterceptionAgent>,
    handle: AgentHandle,
    lifecycle: Arc<watch::Sender<AgentLifecycle>>,
}

#[derive(Default)]
struct Slots {
    script: Option<String>,
    active: Option<Worker>,
    waiting: Option<Worker>,
    installing: Option<Worker>,
}

struct Shared {
    slots: Mutex<Slots>,
    events: broadcast::Sender<AgentEvent>,
    next_id: AtomicU64,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activate(&self, worker: &Worker) {
        {
            let mut slots = self.slots();
            if slots
                .waiting
                .as_ref()
                .is_some_and(|w| w.handle.id == worker.handle.id)
            {
                slots.waiting = None;
            }
            if let Some(old) = slots.active.replace(worker.clone()) {
                tracing::info!(
                    "Agent {} replaced by {}",
                    old.agent.version(),
                    worker.agent.version()
                );
                old.lifecycle.send_replace(AgentLifecycle::Redundant);
            }
        }
        worker.lifecycle.send_replace(AgentLifecycle::Activating);
        worker.lifecycle.send_replace(AgentLifecycle::Activated);
        tracing::info!("Agent {} activated", worker.agent.version());

        // No subscribers just means no page is listening yet.
        let _ = self.events.send(AgentEvent::RequestSync);
    }

    fn is_waiting(&self, id: u64) -> bool {
        self.slots().waiting.as_ref().is_some_and(|w| w.handle.id == id)
    }
}

/// In-process agent host. Each agent runs as a tokio task processing its
/// inbox in order.
pub struct LocalAgentHost {
    version: Mutex<String>,
    shared: Arc<Shared>,
}

impl LocalAgentHost {
    pub fn new(version: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            version: Mutex::new(version.into()),
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::default()),
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn current_version(&self) -> String {
        self.version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self) -> AgentRegistration {
        let slots = self.shared.slots();
        AgentRegistration {
            active: slots.active.as_ref().map(|w| w.handle.clone()),
            waiting: slots.waiting.as_ref().map(|w| w.handle.clone()),
            installing: slots.installing.as_ref().map(|w| w.handle.clone()),
        }
    }

    /// Ships a new agent version. When an agent is active the new one
    /// installs and then waits for `SkipWaiting`.
    pub fn publish_update(&self, version: impl Into<String>) {
        let version = version.into();
        *self.version.lock().unwrap_or_else(PoisonError::into_inner) = version.clone();
        if self.shared.slots().script.is_some() {
            self.install(version);
        }
    }

    /// Runs `request` through the active agent.
    pub fn fetch(&self, request: &InterceptedRequest) -> FetchDisposition {
        let active = self.shared.slots().active.as_ref().map(|w| w.agent.clone());
        match active {
            Some(agent) => agent.handle_fetch(request),
            None => FetchDisposition::PassThrough,
        }
    }

    /// The agent currently answering requests.
    pub fn active_agent(&self) -> Option<Arc<InterceptionAgent>> {
        self.shared.slots().active.as_ref().map(|w| w.agent.clone())
    }

    fn install(&self, version: String) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbox, rx) = mpsc::unbounded_channel();
        let (lifecycle, lifecycle_rx) = watch::channel(AgentLifecycle::Installing);
        let worker = Worker {
            agent: Arc::new(InterceptionAgent::new(version.clone())),
            handle: AgentHandle {
                id,
                version,
                lifecycle: lifecycle_rx,
                inbox,
            },
            lifecycle: Arc::new(lifecycle),
        };

        tracing::info!("Installing agent {}", worker.agent.version());
        self.shared.slots().installing = Some(worker.clone());
        tokio::spawn(run_worker(
            self.shared.clone(),
            worker.agent,
            worker.lifecycle,
            id,
            rx,
        ));
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    agent: Arc<InterceptionAgent>,
    lifecycle: Arc<watch::Sender<AgentLifecycle>>,
    id: u64,
    mut inbox: mpsc::UnboundedReceiver<AgentMessage>,
) {
    let worker = {
        let mut slots = shared.slots();
        let Some(worker) = slots.installing.take_if(|w| w.handle.id == id) else {
            // Superseded by a newer install before finishing.
            lifecycle.send_replace(AgentLifecycle::Redundant);
            return;
        };
        lifecycle.send_replace(AgentLifecycle::Installed);
        if slots.active.is_some() {
            if let Some(stale) = slots.waiting.replace(worker.clone()) {
                stale.lifecycle.send_replace(AgentLifecycle::Redundant);
            }
            tracing::info!("Agent {} installed, waiting", agent.version());
            None
        } else {
            Some(worker)
        }
    };
    if let Some(worker) = worker {
        shared.activate(&worker);
    }

    while let Some(message) = inbox.recv().await {
        if *lifecycle.borrow() == AgentLifecycle::Redundant {
            continue;
        }
        match message {
            AgentMessage::SkipWaiting => {
                if shared.is_waiting(id) {
                    let waiting = shared.slots().waiting.clone();
                    if let Some(worker) = waiting {
                        shared.activate(&worker);
                    }
                }
            }
            other => agent.handle_message(&other),
        }
    }
    tracing::debug!("Agent {} stopped", agent.version());
}

#[async_trait]
impl AgentHost for LocalAgentHost {
    async fn register(&self, script: &str, scope: &str) -> Result<AgentRegistration> {
        let fresh = {
            let mut slots = self.shared.slots();
            if slots.script.is_none() {
                slots.script = Some(script.to_string());
                true
            } else {
                false
            }
        };
        if fresh {
            tracing::info!("Registering agent script {} for scope {}", script, scope);
            self.install(self.current_version());
        }
        Ok(self.snapshot())
    }

    async fn registration(&self) -> Option<AgentRegistration> {
        if self.shared.slots().script.is_none() {
            return None;
        }
        Some(self.snapshot())
    }

    fn events(&self) -> broadcast::Receiver<AgentEvent> {
        self.shared.events.subscribe()
    }
}

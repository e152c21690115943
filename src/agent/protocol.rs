use axum::http::{Method, Uri};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{MockRoute, MockServerStatus};

/// Page → agent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    UpdateRoutes {
        #[serde(default)]
        routes: Vec<MockRoute>,
    },
    UpdateStatus {
        #[serde(default)]
        status: MockServerStatus,
    },
    SyncData {
        #[serde(default)]
        routes: Vec<MockRoute>,
        #[serde(default)]
        status: MockServerStatus,
    },
    /// Promote a waiting agent over the active one.
    SkipWaiting,
}

/// Agent → page messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentEvent {
    /// Sent on activation so the page pushes its persisted state.
    RequestSync,
}

/// An outgoing request observed by the agent.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub uri: Uri,
}

impl InterceptedRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri }
    }

    pub fn parse(method: &str, url: &str) -> Result<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::Agent(format!("invalid method {}: {}", method, e)))?;
        let uri = url
            .parse::<Uri>()
            .map_err(|e| Error::Agent(format!("invalid url {}: {}", url, e)))?;
        Ok(Self { method, uri })
    }

    pub fn host(&self) -> Option<&str> {
        self.uri.host()
    }

    pub fn path(&self) -> &str {
        match self.uri.path() {
            "" => "/",
            path => path,
        }
    }

    /// Explicit port, else the scheme default (443 for https, 80 otherwise).
    pub fn effective_port(&self) -> u16 {
        self.uri.port_u16().unwrap_or_else(|| {
            if self.uri.scheme_str() == Some("https") {
                443
            } else {
                80
            }
        })
    }
}

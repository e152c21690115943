use std::sync::Arc;

use async_trait::async_trait;

use super::MockServerBackend;
use crate::error::{Error, Result};
use crate::models::{MockRoute, MockServerStatus};

/// Control surface of an HTTP server owned outside the caller.
#[async_trait]
pub trait NativeShell: Send + Sync {
    async fn start(&self, port: u16, routes: Vec<MockRoute>) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn add_route(&self, route: MockRoute) -> Result<()>;
    async fn status(&self) -> Result<MockServerStatus>;
}

/// Pass-through to a [`NativeShell`]. Without one every call fails with
/// [`Error::NativeUnavailable`].
pub struct NativeBackend {
    shell: Option<Arc<dyn NativeShell>>,
}

impl NativeBackend {
    pub fn new(shell: Option<Arc<dyn NativeShell>>) -> Self {
        Self { shell }
    }

    fn shell(&self) -> Result<&Arc<dyn NativeShell>> {
        self.shell.as_ref().ok_or(Error::NativeUnavailable)
    }
}

#[async_trait]
impl MockServerBackend for NativeBackend {
    async fn start(&self, port: u16, routes: Vec<MockRoute>) -> Result<()> {
        self.shell()?.start(port, routes).await
    }

    async fn stop(&self) -> Result<()> {
        self.shell()?.stop().await
    }

    async fn add_route(&self, route: MockRoute) -> Result<()> {
        self.shell()?.add_route(route).await
    }

    async fn status(&self) -> Result<MockServerStatus> {
        self.shell()?.status().await
    }
}

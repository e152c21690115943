//! The native listener: a real HTTP server on `127.0.0.1:<port>` answering
//! from a live route table, with an admin API under `/_admin`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{Path as AxPath, Request, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::stream::Stream;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock, broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::backend::NativeShell;
use crate::error::{Error, Result};
use crate::models::{MockRoute, MockServerStatus};
use crate::store::RouteStore;
use crate::{matcher, metrics, responder};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, serde::Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
    pub matched: bool,
    pub status: u16,
}

pub struct AppState {
    pub routes: RwLock<RouteStore>,
    pub port: u16,
    log_tx: broadcast::Sender<LogEntry>,
}

impl AppState {
    pub fn new(routes: Vec<MockRoute>, port: u16) -> Self {
        let (log_tx, _) = broadcast::channel(100);
        Self {
            routes: RwLock::new(RouteStore::new(routes)),
            port,
            log_tx,
        }
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::RouteIndex { .. } => StatusCode::NOT_FOUND,
            Error::MalformedRoutes(_) | Error::MalformedDocument { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidSchema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotRunning => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            Error::InvalidSchema(errors) => json!({ "error": self.to_string(), "errors": errors }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let admin_router = Router::new()
        .route("/routes", get(list_routes).post(add_route))
        .route("/routes/:index", put(update_route).delete(delete_route))
        .route("/import", post(import_routes))
        .route("/export", get(list_routes))
        .route("/status", get(server_status))
        .route("/logs/stream", get(stream_logs))
        .route("/metrics", get(render_metrics));

    Router::new()
        .nest("/_admin", admin_router)
        .fallback(handle_request)
        .with_state(state)
}

// Admin Handlers
async fn list_routes(State(state): State<Arc<AppState>>) -> Json<Vec<MockRoute>> {
    Json(state.routes.read().await.routes().to_vec())
}

async fn add_route(
    State(state): State<Arc<AppState>>,
    Json(route): Json<MockRoute>,
) -> (StatusCode, Json<MockRoute>) {
    state.routes.write().await.add(route.clone());
    (StatusCode::CREATED, Json(route))
}

async fn update_route(
    State(state): State<Arc<AppState>>,
    AxPath(index): AxPath<usize>,
    Json(route): Json<MockRoute>,
) -> Result<StatusCode> {
    state.routes.write().await.update(index, route)?;
    Ok(StatusCode::OK)
}

async fn delete_route(
    State(state): State<Arc<AppState>>,
    AxPath(index): AxPath<usize>,
) -> Result<StatusCode> {
    state.routes.write().await.remove(index)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts either a route array or an OpenAPI document (JSON or YAML) and
/// merges it without creating duplicates.
async fn import_routes(State(state): State<Arc<AppState>>, body: String) -> Result<Json<Value>> {
    let mut routes = state.routes.write().await;
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(_)) => {
            let added = routes.import_json(&body)?;
            Ok(Json(json!({ "added": added })))
        }
        Ok(document) => {
            let outcome = routes.import_openapi_value(&document)?;
            Ok(Json(json!(outcome)))
        }
        Err(_) => {
            let outcome = routes.import_openapi(&body)?;
            Ok(Json(json!(outcome)))
        }
    }
}

async fn server_status(State(state): State<Arc<AppState>>) -> Json<MockServerStatus> {
    Json(MockServerStatus::running(state.port))
}

async fn stream_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let mut rx = state.subscribe_logs();

    let stream = async_stream::stream! {
        while let Ok(entry) = rx.recv().await {
            match Event::default().json_data(&entry) {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::warn!("Dropping log entry: {}", e),
            }
        }
    };

    Sse::new(stream)
}

async fn render_metrics() -> Response {
    let (content_type, body) = metrics::render();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn handle_request(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let method = parts.method.as_str().to_string();

    let body_bytes = body
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();
    let body_json: Option<Value> = serde_json::from_slice(&body_bytes).ok();

    tracing::info!("Incoming request: {} {}", method, path);

    // Clone so the route table is not locked across the delay.
    let matched = {
        let routes = state.routes.read().await;
        matcher::find_route(routes.routes(), &method, &path).cloned()
    };

    let response = match &matched {
        Some(route) => {
            if route.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(route.delay_ms)).await;
            }
            responder::respond(route)
        }
        None => {
            tracing::warn!("No match found for {} {}", method, path);
            responder::not_found(&method, &path)
        }
    };

    let _ = state.log_tx.send(LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        method: method.clone(),
        path,
        body: body_json,
        matched: matched.is_some(),
        status: response.status.as_u16(),
    });
    metrics::record_request(
        matched.is_some(),
        &method,
        started.elapsed().as_secs_f64(),
    );

    response.into_response()
}

struct RunningListener {
    state: Arc<AppState>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct ListenerSlot {
    running: Option<RunningListener>,
    last_port: u16,
}

/// In-process [`NativeShell`] serving [`router`] on a tokio task.
pub struct ListenerShell {
    slot: Mutex<ListenerSlot>,
}

impl Default for ListenerShell {
    fn default() -> Self {
        Self {
            slot: Mutex::new(ListenerSlot {
                running: None,
                last_port: crate::models::DEFAULT_PORT,
            }),
        }
    }
}

impl ListenerShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live route table, or empty when stopped.
    pub async fn routes(&self) -> Vec<MockRoute> {
        let slot = self.slot.lock().await;
        match &slot.running {
            Some(listener) => listener.state.routes.read().await.routes().to_vec(),
            None => Vec::new(),
        }
    }

    /// Shared state of the running listener.
    pub async fn state(&self) -> Option<Arc<AppState>> {
        self.slot
            .lock()
            .await
            .running
            .as_ref()
            .map(|l| l.state.clone())
    }

    async fn shutdown(listener: RunningListener) {
        let port = listener.state.port;
        let _ = listener.shutdown.send(());
        let mut handle = listener.handle;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
            tracing::warn!("Listener on port {} did not drain in time, aborting", port);
            handle.abort();
        }
        tracing::info!("Mock server on port {} stopped", port);
    }
}

#[async_trait]
impl NativeShell for ListenerShell {
    async fn start(&self, port: u16, routes: Vec<MockRoute>) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.running.take() {
            Self::shutdown(previous).await;
        }

        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| Error::Bind { port, source })?;
        let port = listener.local_addr()?.port();

        let route_count = routes.len();
        let state = Arc::new(AppState::new(routes, port));
        let app = router(state.clone());
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!("Mock server error: {}", e);
            }
        });

        tracing::info!(
            "Mock server running on http://localhost:{} ({} routes)",
            port,
            route_count
        );
        slot.last_port = port;
        slot.running = Some(RunningListener {
            state,
            shutdown,
            handle,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let running = self.slot.lock().await.running.take();
        if let Some(listener) = running {
            Self::shutdown(listener).await;
        }
        Ok(())
    }

    async fn add_route(&self, route: MockRoute) -> Result<()> {
        let slot = self.slot.lock().await;
        let listener = slot.running.as_ref().ok_or(Error::NotRunning)?;
        listener.state.routes.write().await.add(route);
        Ok(())
    }

    async fn status(&self) -> Result<MockServerStatus> {
        let slot = self.slot.lock().await;
        Ok(match &slot.running {
            Some(listener) => MockServerStatus::running(listener.state.port),
            None => MockServerStatus::stopped(slot.last_port),
        })
    }
}

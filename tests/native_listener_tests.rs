use std::sync::Arc;
use std::time::{Duration, Instant};

use loopmock::backend::{
    BackendKind, BackendSelector, MockServerBackend, NativeBackend, NativeShell, RuntimeContext,
};
use loopmock::persist::MemoryStore;
use loopmock::server::ListenerShell;
use loopmock::{Error, MockRoute, MockServerStatus};
use serde_json::{Value, json};

fn native_backend() -> (Arc<ListenerShell>, NativeBackend) {
    let shell = Arc::new(ListenerShell::new());
    let backend = NativeBackend::new(Some(shell.clone() as Arc<dyn NativeShell>));
    (shell, backend)
}

#[tokio::test]
async fn test_listener_serves_and_accepts_new_routes() -> Result<(), Box<dyn std::error::Error>> {
    let (shell, backend) = native_backend();
    backend
        .start(
            0,
            vec![
                MockRoute::new("GET", "/api/users")
                    .with_status(201)
                    .with_body(json!({ "id": 1 })),
            ],
        )
        .await?;

    let status = backend.status().await?;
    assert!(status.running);
    let base_url = format!("http://127.0.0.1:{}", status.port);
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/api/users", base_url)).send().await?;
    assert_eq!(res.status(), 201);
    assert_eq!(
        res.headers()["content-type"].to_str()?,
        "application/json"
    );
    assert_eq!(res.json::<Value>().await?, json!({ "id": 1 }));

    backend
        .add_route(MockRoute::new("GET", "/health").with_body(json!("ok")))
        .await?;
    let res = client.get(format!("{}/health", base_url)).send().await?;
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await?, "ok");
    assert_eq!(shell.routes().await.len(), 2);

    backend.stop().await?;
    assert_eq!(
        backend.status().await?,
        MockServerStatus::stopped(status.port)
    );
    let fresh = reqwest::Client::new();
    assert!(fresh.get(format!("{}/health", base_url)).send().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_add_route_requires_running_listener() {
    let (_, backend) = native_backend();
    let err = backend
        .add_route(MockRoute::new("GET", "/late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotRunning));
}

#[tokio::test]
async fn test_delay_holds_only_the_delayed_request() -> Result<(), Box<dyn std::error::Error>> {
    let (_, backend) = native_backend();
    backend
        .start(
            0,
            vec![
                MockRoute::new("GET", "/slow").with_delay(300),
                MockRoute::new("GET", "/fast"),
            ],
        )
        .await?;
    let base_url = format!("http://127.0.0.1:{}", backend.status().await?.port);
    let client = reqwest::Client::new();

    let started = Instant::now();
    let slow = tokio::spawn({
        let client = client.clone();
        let url = format!("{}/slow", base_url);
        async move { client.get(url).send().await.map(|r| r.status()) }
    });
    let fast = client.get(format!("{}/fast", base_url)).send().await?;
    assert_eq!(fast.status(), 200);
    assert!(started.elapsed() < Duration::from_millis(300));

    assert_eq!(slow.await??, 200);
    assert!(started.elapsed() >= Duration::from_millis(300));

    backend.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = taken.local_addr()?.port();

    let (_, backend) = native_backend();
    let err = backend.start(port, vec![]).await.unwrap_err();
    assert!(matches!(err, Error::Bind { port: p, .. } if p == port));
    assert!(!backend.status().await?.running);
    Ok(())
}

#[tokio::test]
async fn test_selector_prefers_native_listener() -> Result<(), Box<dyn std::error::Error>> {
    let shell = Arc::new(ListenerShell::new());
    let selector = BackendSelector::new(RuntimeContext {
        native: Some(shell.clone()),
        agent_host: None,
        store: Arc::new(MemoryStore::new()),
    });
    assert_eq!(selector.kind(), BackendKind::Native);

    let backend = selector.get();
    backend.start(0, vec![]).await?;
    assert!(shell.state().await.is_some());
    assert!(Arc::ptr_eq(&backend, &selector.get()));
    backend.stop().await?;
    Ok(())
}

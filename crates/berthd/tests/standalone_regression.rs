//! Standalone regression tests.
//!
//! Assembles the daemon's pieces the way standalone mode does: a config file
//! on disk, a redb store under a data directory, the in-memory substrates and
//! the API router.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use berth_api::build_router;
use berth_core::{BerthConfig, CancelSignal, cancel_pair};
use berth_orchestrator::{Orchestrator, OrchestratorSettings};
use berth_state::StateStore;
use berth_substrate::{MemoryCluster, MemoryStager};

const CONFIG: &str = r#"
[server]
port = 9000

[deploy]
timeout = "300ms"
poll_interval = "10ms"

[apps]
domain = "apps.example.org"
app_charts = ["standard", "gpu"]
"#;

fn write_config(dir: &Path) -> BerthConfig {
    let path = dir.join("berth.toml");
    std::fs::write(&path, CONFIG).unwrap();
    BerthConfig::from_file(&path).unwrap()
}

async fn router_for(
    config: &BerthConfig,
    store: StateStore,
    stager: MemoryStager,
    shutdown: CancelSignal,
) -> Router {
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(MemoryCluster::new()),
        Arc::new(stager),
        OrchestratorSettings::from_config(config),
    );
    orchestrator.forget_lost_workloads().await.unwrap();
    build_router(orchestrator, shutdown)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.deploy_timeout(), Duration::from_millis(300));
    assert_eq!(config.apps.default_instances, 1);

    let settings = OrchestratorSettings::from_config(&config);
    assert_eq!(settings.domain, "apps.example.org");
    assert_eq!(settings.default_app_chart, "standard");
}

#[test]
fn config_with_unknown_default_chart_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("berth.toml");
    std::fs::write(&path, "[apps]\napp_charts = [\"gpu\"]\n").unwrap();
    assert!(BerthConfig::from_file(&path).is_err());
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let db_path = dir.path().join("berth.redb");

    {
        let router = router_for(
            &config,
            StateStore::open(&db_path).unwrap(),
            MemoryStager::new(),
            CancelSignal::never(),
        )
        .await;
        send(&router, "POST", "/api/v1/namespaces", Some(json!({"name": "workspace"}))).await;
        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/namespaces/workspace/applications",
            Some(json!({"name": "shop", "app_chart": "gpu"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["routes"], json!(["shop.apps.example.org"]));

        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/namespaces/workspace/applications/web/push",
            Some(json!({"source": "docker://nginx:1.25"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["workload"].is_object());
    }

    let router = router_for(
        &config,
        StateStore::open(&db_path).unwrap(),
        MemoryStager::new(),
        CancelSignal::never(),
    )
    .await;
    let (status, body) = send(&router, "GET", "/api/v1/namespaces/workspace/applications/shop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["app_chart"], "gpu");
    assert_eq!(body["data"]["owner"], "anonymous");

    // The in-memory cluster starts empty, so the old workload is forgotten.
    let (status, body) = send(&router, "GET", "/api/v1/namespaces/workspace/applications/web", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["workload"].is_null());
    assert!(body["data"]["status"].is_null());
    assert_eq!(body["data"]["image"], "nginx:1.25");
}

#[tokio::test]
async fn shutdown_cancels_blocked_push() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let stager = MemoryStager::new();
    stager.set_held(true).await;
    let (handle, shutdown) = cancel_pair();
    let router = router_for(
        &config,
        StateStore::open(&dir.path().join("berth.redb")).unwrap(),
        stager,
        shutdown,
    )
    .await;
    send(&router, "POST", "/api/v1/namespaces", Some(json!({"name": "workspace"}))).await;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });
    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/namespaces/workspace/applications/shop/push",
        Some(json!({"source": "git+https://git.example.org/shop.git#main"})),
    )
    .await;
    assert_eq!(status.as_u16(), 499);
    assert_eq!(body["errors"][0]["title"], "Cancelled");
}

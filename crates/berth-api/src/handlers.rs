//! Namespace and application handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use berth_core::Origin;
use berth_orchestrator::{CreateRequest, PushRequest, UpdateRequest};

use crate::{Actor, ApiError, ApiResponse, ApiState};

type ApiResult = Result<Response, ApiError>;

// ── Namespaces ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NamespaceBody {
    pub name: String,
}

/// GET /api/v1/namespaces
pub async fn list_namespaces(State(state): State<ApiState>) -> ApiResult {
    let namespaces = state.orchestrator.list_namespaces()?;
    Ok(ApiResponse::ok(namespaces).into_response())
}

/// POST /api/v1/namespaces
pub async fn create_namespace(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Json(body): Json<NamespaceBody>,
) -> ApiResult {
    let record = state.orchestrator.create_namespace(&body.name, &user)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(record)).into_response())
}

/// DELETE /api/v1/namespaces/{ns}
pub async fn delete_namespace(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path(ns): Path<String>,
) -> ApiResult {
    let cancel = state.cancel_signal();
    state
        .orchestrator
        .delete_namespace(&ns, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "deleted": ns })).into_response())
}

// ── Applications ───────────────────────────────────────────────

/// GET /api/v1/namespaces/{ns}/applications
pub async fn list_applications(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
) -> ApiResult {
    let apps = state.orchestrator.list(&ns)?;
    Ok(ApiResponse::ok(apps).into_response())
}

/// POST /api/v1/namespaces/{ns}/applications
pub async fn create_application(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path(ns): Path<String>,
    Json(request): Json<CreateRequest>,
) -> ApiResult {
    let app = state.orchestrator.create(&ns, request, &user).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(app)).into_response())
}

/// GET /api/v1/namespaces/{ns}/applications/{app}
pub async fn show_application(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let details = state.orchestrator.show(&app).await?;
    Ok(ApiResponse::ok(details).into_response())
}

/// PATCH /api/v1/namespaces/{ns}/applications/{app}
pub async fn update_application(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, name)): Path<(String, String)>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult {
    if request.is_empty() {
        return Err(ApiError::bad_request("update request changes nothing"));
    }
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let updated = state
        .orchestrator
        .update(&app, request, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(updated).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/applications/{app}
pub async fn delete_application(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let unbound = state.orchestrator.delete(&app).await?;
    Ok(ApiResponse::ok(json!({ "unbound_configurations": unbound })).into_response())
}

/// Push payload. `source` is the compact origin form (`docker://…`,
/// `git+https://…#rev`, `file://…`) and wins over a structured `origin`.
#[derive(Debug, Deserialize)]
pub struct PushBody {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub request: PushRequest,
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/push
pub async fn push_application(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, name)): Path<(String, String)>,
    Json(body): Json<PushBody>,
) -> ApiResult {
    let mut request = body.request;
    if let Some(source) = &body.source {
        let origin = Origin::parse(source).map_err(|e| ApiError::bad_request(e.to_string()))?;
        request.origin = Some(origin);
    }
    debug!(namespace = %ns, app = %name, origin = ?request.origin, "push requested");

    let cancel = state.cancel_signal();
    let app = state
        .orchestrator
        .push(&ns, &name, request, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(app).into_response())
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/restage
pub async fn restage_application(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let restaged = state.orchestrator.restage(&app, &user, &cancel).await?;
    Ok(ApiResponse::ok(restaged).into_response())
}

/// GET /api/v1/namespaces/{ns}/applications/{app}/running
pub async fn wait_for_running(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let status = state.orchestrator.wait_for_running(&app, &cancel).await?;
    Ok(ApiResponse::ok(status).into_response())
}

// ── Environment ────────────────────────────────────────────────

/// GET /api/v1/namespaces/{ns}/applications/{app}/environment
pub async fn list_environment(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let environment = state.orchestrator.list_environment(&app)?;
    Ok(ApiResponse::ok(environment).into_response())
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/environment
pub async fn set_environment(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, name)): Path<(String, String)>,
    Json(vars): Json<BTreeMap<String, String>>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let restart = state
        .orchestrator
        .set_environment(&app, &vars, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "restart": restart })).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/applications/{app}/environment/{var}
pub async fn unset_environment(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, name, var)): Path<(String, String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let removed = state
        .orchestrator
        .unset_environment(&app, &var, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "removed": removed })).into_response())
}

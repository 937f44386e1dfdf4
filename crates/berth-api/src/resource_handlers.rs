//! Configuration, service and binding handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::{Actor, ApiError, ApiResponse, ApiState};

type ApiResult = Result<Response, ApiError>;

/// `?unbind=true` on deletes of bound resources.
#[derive(Debug, Default, Deserialize)]
pub struct UnbindQuery {
    #[serde(default)]
    pub unbind: bool,
}

#[derive(Debug, Deserialize)]
pub struct BindBody {
    pub app: String,
}

// ── Configurations ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateConfigurationBody {
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceConfigurationBody {
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditConfigurationBody {
    pub set: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

/// GET /api/v1/namespaces/{ns}/configurations
pub async fn list_configurations(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
) -> ApiResult {
    let configurations = state.orchestrator.list_configurations(&ns)?;
    Ok(ApiResponse::ok(configurations).into_response())
}

/// POST /api/v1/namespaces/{ns}/configurations
pub async fn create_configuration(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
    Json(body): Json<CreateConfigurationBody>,
) -> ApiResult {
    let record = state
        .orchestrator
        .create_configuration(&ns, &body.name, body.values)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(record)).into_response())
}

/// GET /api/v1/namespaces/{ns}/configurations/{cfg}
pub async fn show_configuration(
    State(state): State<ApiState>,
    Path((ns, cfg)): Path<(String, String)>,
) -> ApiResult {
    let details = state.orchestrator.show_configuration(&ns, &cfg)?;
    Ok(ApiResponse::ok(details).into_response())
}

/// PUT /api/v1/namespaces/{ns}/configurations/{cfg}
pub async fn replace_configuration(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, cfg)): Path<(String, String)>,
    Json(body): Json<ReplaceConfigurationBody>,
) -> ApiResult {
    let cancel = state.cancel_signal();
    let changed = state
        .orchestrator
        .replace_configuration(&ns, &cfg, body.values, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "changed": changed })).into_response())
}

/// PATCH /api/v1/namespaces/{ns}/configurations/{cfg}
pub async fn update_configuration(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, cfg)): Path<(String, String)>,
    Json(body): Json<EditConfigurationBody>,
) -> ApiResult {
    let cancel = state.cancel_signal();
    let changed = state
        .orchestrator
        .update_configuration(&ns, &cfg, &body.set, &body.remove, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "changed": changed })).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/configurations/{cfg}
pub async fn delete_configuration(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, cfg)): Path<(String, String)>,
    Query(query): Query<UnbindQuery>,
) -> ApiResult {
    let cancel = state.cancel_signal();
    let unbound = state
        .orchestrator
        .delete_configuration(&ns, &cfg, query.unbind, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "unbound_applications": unbound })).into_response())
}

/// POST /api/v1/namespaces/{ns}/configurations/{cfg}/bind
pub async fn bind_configuration(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, cfg)): Path<(String, String)>,
    Json(body): Json<BindBody>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &body.app)?;
    let cancel = state.cancel_signal();
    let created = state
        .orchestrator
        .bind_configurations(&app, &[cfg], &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "bound": created })).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/configurations/{cfg}/bind/{app}
pub async fn unbind_configuration(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, cfg, name)): Path<(String, String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let removed = state
        .orchestrator
        .unbind_configuration(&app, &cfg, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "removed": removed })).into_response())
}

// ── Services ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateServiceBody {
    pub name: String,
    pub catalog_service: String,
}

/// GET /api/v1/namespaces/{ns}/services
pub async fn list_services(State(state): State<ApiState>, Path(ns): Path<String>) -> ApiResult {
    let services = state.orchestrator.list_services(&ns)?;
    Ok(ApiResponse::ok(services).into_response())
}

/// POST /api/v1/namespaces/{ns}/services
pub async fn create_service(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path(ns): Path<String>,
    Json(body): Json<CreateServiceBody>,
) -> ApiResult {
    let record = state
        .orchestrator
        .create_service(&ns, &body.name, &body.catalog_service, &user)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(record)).into_response())
}

/// GET /api/v1/namespaces/{ns}/services/{svc}
pub async fn show_service(
    State(state): State<ApiState>,
    Path((ns, svc)): Path<(String, String)>,
) -> ApiResult {
    let details = state.orchestrator.show_service(&ns, &svc)?;
    Ok(ApiResponse::ok(details).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/services/{svc}
pub async fn delete_service(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, svc)): Path<(String, String)>,
    Query(query): Query<UnbindQuery>,
) -> ApiResult {
    let cancel = state.cancel_signal();
    let unbound = state
        .orchestrator
        .delete_service(&ns, &svc, query.unbind, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "unbound_applications": unbound })).into_response())
}

/// POST /api/v1/namespaces/{ns}/services/{svc}/bind
pub async fn bind_service(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, svc)): Path<(String, String)>,
    Json(body): Json<BindBody>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &body.app)?;
    let cancel = state.cancel_signal();
    let configurations = state
        .orchestrator
        .bind_service(&app, &svc, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "configurations": configurations })).into_response())
}

/// DELETE /api/v1/namespaces/{ns}/services/{svc}/bind/{app}
pub async fn unbind_service(
    State(state): State<ApiState>,
    Actor(user): Actor,
    Path((ns, svc, name)): Path<(String, String, String)>,
) -> ApiResult {
    let app = state.orchestrator.app_ref(&ns, &name)?;
    let cancel = state.cancel_signal();
    let configurations = state
        .orchestrator
        .unbind_service(&app, &svc, &user, &cancel)
        .await?;
    Ok(ApiResponse::ok(json!({ "configurations": configurations })).into_response())
}

//! berth-api: REST API for the berth control plane.
//!
//! Thin axum handlers over [`Orchestrator`]. Every success is wrapped as
//! `{ "success": true, "data": … }`; failures render as
//! `{ "success": false, "errors": [{ "status", "title", "details" }] }` with
//! the status taken from the error taxonomy (see [`error::status_for`]).
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET/POST | `/api/v1/namespaces` | List / create namespaces |
//! | DELETE | `/api/v1/namespaces/{ns}` | Delete a namespace and its contents |
//! | GET/POST | `/api/v1/namespaces/{ns}/applications` | List / create applications |
//! | GET/PATCH/DELETE | `/api/v1/namespaces/{ns}/applications/{app}` | Show / update / delete |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/push` | Create if absent, stage, deploy |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/restage` | Stage again and deploy |
//! | GET | `/api/v1/namespaces/{ns}/applications/{app}/running` | Wait until ready |
//! | GET/POST | `/api/v1/namespaces/{ns}/applications/{app}/environment` | List / set variables |
//! | DELETE | `/api/v1/namespaces/{ns}/applications/{app}/environment/{var}` | Unset a variable |
//! | GET/POST | `/api/v1/namespaces/{ns}/configurations` | List / create configurations |
//! | GET/PUT/PATCH/DELETE | `/api/v1/namespaces/{ns}/configurations/{cfg}` | Show / replace / edit / delete |
//! | POST | `/api/v1/namespaces/{ns}/configurations/{cfg}/bind` | Bind to an application |
//! | DELETE | `/api/v1/namespaces/{ns}/configurations/{cfg}/bind/{app}` | Unbind |
//! | GET/POST | `/api/v1/namespaces/{ns}/services` | List / create services |
//! | GET/DELETE | `/api/v1/namespaces/{ns}/services/{svc}` | Show / delete |
//! | POST | `/api/v1/namespaces/{ns}/services/{svc}/bind` | Bind to an application |
//! | DELETE | `/api/v1/namespaces/{ns}/services/{svc}/bind/{app}` | Unbind |
//!
//! Deletes of bound configurations and services take `?unbind=true`.

pub mod error;
pub mod handlers;
pub mod resource_handlers;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use berth_core::CancelSignal;
use berth_orchestrator::Orchestrator;

pub use error::ApiError;

/// Header naming the acting user. Authentication happens in front of us.
pub const USER_HEADER: &str = "x-berth-user";
pub const ANONYMOUS: &str = "anonymous";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
    /// Fires on server shutdown; handed to every blocking operation.
    pub shutdown: CancelSignal,
}

impl ApiState {
    /// Cancellation for one request. A client disconnect drops the handler
    /// future, so only shutdown needs a signal.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.shutdown.clone()
    }
}

/// The acting user, from [`USER_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANONYMOUS);
        Ok(Actor(user.to_string()))
    }
}

/// Response wrapper for consistent API format.
#[derive(Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Build the `/api/v1` router.
pub fn build_router(orchestrator: Orchestrator, shutdown: CancelSignal) -> Router {
    let state = ApiState {
        orchestrator,
        shutdown,
    };

    let api_routes = Router::new()
        .route(
            "/namespaces",
            get(handlers::list_namespaces).post(handlers::create_namespace),
        )
        .route("/namespaces/{ns}", delete(handlers::delete_namespace))
        .route(
            "/namespaces/{ns}/applications",
            get(handlers::list_applications).post(handlers::create_application),
        )
        .route(
            "/namespaces/{ns}/applications/{app}",
            get(handlers::show_application)
                .patch(handlers::update_application)
                .delete(handlers::delete_application),
        )
        .route(
            "/namespaces/{ns}/applications/{app}/push",
            post(handlers::push_application),
        )
        .route(
            "/namespaces/{ns}/applications/{app}/restage",
            post(handlers::restage_application),
        )
        .route(
            "/namespaces/{ns}/applications/{app}/running",
            get(handlers::wait_for_running),
        )
        .route(
            "/namespaces/{ns}/applications/{app}/environment",
            get(handlers::list_environment).post(handlers::set_environment),
        )
        .route(
            "/namespaces/{ns}/applications/{app}/environment/{var}",
            delete(handlers::unset_environment),
        )
        .route(
            "/namespaces/{ns}/configurations",
            get(resource_handlers::list_configurations)
                .post(resource_handlers::create_configuration),
        )
        .route(
            "/namespaces/{ns}/configurations/{cfg}",
            get(resource_handlers::show_configuration)
                .put(resource_handlers::replace_configuration)
                .patch(resource_handlers::update_configuration)
                .delete(resource_handlers::delete_configuration),
        )
        .route(
            "/namespaces/{ns}/configurations/{cfg}/bind",
            post(resource_handlers::bind_configuration),
        )
        .route(
            "/namespaces/{ns}/configurations/{cfg}/bind/{app}",
            delete(resource_handlers::unbind_configuration),
        )
        .route(
            "/namespaces/{ns}/services",
            get(resource_handlers::list_services).post(resource_handlers::create_service),
        )
        .route(
            "/namespaces/{ns}/services/{svc}",
            get(resource_handlers::show_service).delete(resource_handlers::delete_service),
        )
        .route(
            "/namespaces/{ns}/services/{svc}/bind",
            post(resource_handlers::bind_service),
        )
        .route(
            "/namespaces/{ns}/services/{svc}/bind/{app}",
            delete(resource_handlers::unbind_service),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

//! Orchestrator errors rendered as HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use berth_orchestrator::OrchestratorError;

/// Status used when the caller's cancellation fired. Not in the IANA
/// registry, so it has no constant.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// One entry of the `errors` array.
#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorEntry {
    pub status: u16,
    pub title: String,
    pub details: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    errors: Vec<ErrorEntry>,
}

/// Handler error. Wraps the orchestrator taxonomy and maps it to a status.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError(OrchestratorError::bad_request(message))
    }
}

pub fn status_for(error: &OrchestratorError) -> StatusCode {
    match error {
        OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::AlreadyExists { .. } => StatusCode::CONFLICT,
        OrchestratorError::BadRequest(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Multi(_) if error.is_client_error() => StatusCode::BAD_REQUEST,
        OrchestratorError::Multi(_) => StatusCode::INTERNAL_SERVER_ERROR,
        OrchestratorError::Internal(_)
        | OrchestratorError::StagingFailed(_)
        | OrchestratorError::Inconsistent { .. }
        | OrchestratorError::TeardownIncomplete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        OrchestratorError::DeployFailed(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::NotReadyInTime { .. } => StatusCode::GATEWAY_TIMEOUT,
        OrchestratorError::Cancelled => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::REQUEST_TIMEOUT)
        }
    }
}

fn title_for(error: &OrchestratorError) -> &'static str {
    match error {
        OrchestratorError::NotFound { .. } => "Not Found",
        OrchestratorError::AlreadyExists { .. } => "Conflict",
        OrchestratorError::BadRequest(_) => "Bad Request",
        OrchestratorError::Multi(_) => "Multiple Errors",
        OrchestratorError::Internal(_) => "Internal Error",
        OrchestratorError::StagingFailed(_) => "Staging Failed",
        OrchestratorError::DeployFailed(_) => "Deploy Failed",
        OrchestratorError::NotReadyInTime { .. } => "Not Ready In Time",
        OrchestratorError::Cancelled => "Cancelled",
        OrchestratorError::Inconsistent { .. } => "Inconsistent State",
        OrchestratorError::TeardownIncomplete { .. } => "Teardown Incomplete",
    }
}

/// A multi-error becomes one entry per member; anything else a single entry.
pub fn entries(error: &OrchestratorError) -> Vec<ErrorEntry> {
    match error {
        OrchestratorError::Multi(errors) => errors.iter().flat_map(entries).collect(),
        other => vec![ErrorEntry {
            status: status_for(other).as_u16(),
            title: title_for(other).to_string(),
            details: other.to_string(),
        }],
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            success: false,
            errors: entries(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use berth_core::EntityKind;

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (OrchestratorError::not_found(EntityKind::Application, "a"), 404),
            (
                OrchestratorError::AlreadyExists {
                    kind: EntityKind::Service,
                    name: "db".to_string(),
                },
                409,
            ),
            (OrchestratorError::bad_request("no"), 400),
            (OrchestratorError::Internal("x".to_string()), 500),
            (OrchestratorError::StagingFailed("x".to_string()), 500),
            (OrchestratorError::DeployFailed("x".to_string()), 502),
            (
                OrchestratorError::NotReadyInTime {
                    app: "a".to_string(),
                    timeout: Duration::from_secs(1),
                },
                504,
            ),
            (OrchestratorError::Cancelled, 499),
            (
                OrchestratorError::TeardownIncomplete {
                    app: "ns/a".to_string(),
                    reason: "x".to_string(),
                    unbound: vec!["flags".to_string()],
                },
                500,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(status_for(&error).as_u16(), status, "{error}");
        }
    }

    #[test]
    fn multi_status_depends_on_members() {
        let client = OrchestratorError::Multi(vec![
            OrchestratorError::not_found(EntityKind::Service, "a"),
            OrchestratorError::not_found(EntityKind::Service, "b"),
        ]);
        assert_eq!(status_for(&client), StatusCode::BAD_REQUEST);

        let mixed = OrchestratorError::Multi(vec![
            OrchestratorError::not_found(EntityKind::Service, "a"),
            OrchestratorError::Internal("store".to_string()),
        ]);
        assert_eq!(status_for(&mixed), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn multi_renders_one_entry_per_member() {
        let error = OrchestratorError::Multi(vec![
            OrchestratorError::not_found(EntityKind::Service, "db"),
            OrchestratorError::not_found(EntityKind::Configuration, "flags"),
        ]);
        let rendered = entries(&error);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].status, 404);
        assert_eq!(rendered[1].details, "configuration 'flags' not found");
    }
}

//! Response envelope shared by every route.
//!
//! Success is `{"error":0,"data":...}`; failure is `{"error":<code>,"msg":...}`
//! with the HTTP status equal to `code / 100`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use gamebox_orchestrator::OrchestratorError;
use gamebox_state::StateError;

pub const CODE_BAD_REQUEST: u32 = 40000;
pub const CODE_UNAUTHORIZED: u32 = 40100;
pub const CODE_CONFLICT: u32 = 40300;
pub const CODE_NOT_FOUND: u32 = 40400;
pub const CODE_INTERNAL: u32 = 50000;
pub const CODE_PARTIAL_FAILURE: u32 = 50200;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: u32,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { error: 0, data })
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// A failed request, rendered as an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub code: u32,
    pub msg: String,
}

impl ApiError {
    pub fn new(code: u32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(CODE_BAD_REQUEST, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(CODE_UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(CODE_NOT_FOUND, msg)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16((self.code / 100) as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::NotFound(_) => Self::not_found(e.to_string()),
            OrchestratorError::Conflict(_) => Self::new(CODE_CONFLICT, "Pod has been created"),
            OrchestratorError::PartialFailure { .. } => {
                error!(error = %e, "request left a stale allocation record");
                Self::new(CODE_PARTIAL_FAILURE, e.to_string())
            }
            OrchestratorError::Cluster(_) | OrchestratorError::State(_) => {
                warn!(error = %e, "upstream failure");
                Self::new(CODE_INTERNAL, e.to_string())
            }
        }
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Duplicate(_) => Self::new(CODE_CONFLICT, e.to_string()),
            StateError::Invalid(_) => Self::bad_request(e.to_string()),
            StateError::NotFound(_) => Self::not_found(e.to_string()),
            _ => {
                error!(error = %e, "record store failure");
                Self::new(CODE_INTERNAL, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_code() {
        assert_eq!(ApiError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::new(CODE_CONFLICT, "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::new(CODE_PARTIAL_FAILURE, "x").status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn error_serializes_as_envelope() {
        let body = serde_json::to_value(ApiError::not_found("token is invalid")).unwrap();
        assert_eq!(body, serde_json::json!({"error": 40400, "msg": "token is invalid"}));

        let Json(ok) = Envelope::ok("fine");
        assert_eq!(
            serde_json::to_value(ok).unwrap(),
            serde_json::json!({"error": 0, "data": "fine"})
        );
    }

    #[test]
    fn orchestrator_errors_map_to_codes() {
        let conflict: ApiError = OrchestratorError::Conflict("x".to_string()).into();
        assert_eq!(conflict.code, CODE_CONFLICT);
        assert_eq!(conflict.msg, "Pod has been created");

        let upstream: ApiError = OrchestratorError::State(StateError::Read("io".to_string())).into();
        assert_eq!(upstream.code, CODE_INTERNAL);

        let missing: ApiError = OrchestratorError::NotFound("allocation".to_string()).into();
        assert_eq!(missing.code, CODE_NOT_FOUND);
    }

    #[test]
    fn state_errors_map_to_codes() {
        assert_eq!(ApiError::from(StateError::Duplicate("t".into())).code, CODE_CONFLICT);
        assert_eq!(ApiError::from(StateError::Invalid("t".into())).code, CODE_BAD_REQUEST);
        assert_eq!(ApiError::from(StateError::Write("t".into())).code, CODE_INTERNAL);
    }
}

//! HTTP transport for the control plane and the router.
//!
//! Handlers are thin: decode, call the core, encode. Every failure becomes a
//! JSON body `{ "error": <message>, "code": <stable kind> }`.

mod control_plane;
mod routing;

pub use control_plane::control_plane_router;
pub use routing::routing_router;

use crate::core::ShardError;
use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Shard(ShardError),
    Input(String),
}

impl From<ShardError> for WebError {
    fn from(err: ShardError) -> Self {
        WebError::Shard(err)
    }
}

/// HTTP status for each error kind.
pub fn status_for(err: &ShardError) -> StatusCode {
    match err {
        ShardError::Validation(_) => StatusCode::BAD_REQUEST,
        ShardError::ShardNotFound(_) | ShardError::FleetNotFound(_) | ShardError::NotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ShardError::NoCandidateRegion(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ShardError::Conflict(_) => StatusCode::CONFLICT,
        ShardError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ShardError::Storage(_) | ShardError::LockError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Shard(err) => (status_for(&err), err.to_string(), err.kind().to_string()),
            WebError::Input(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "validation_error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Decodes a JSON request body, mapping malformed input and unknown enum
/// values to `validation_error`.
pub(crate) fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| WebError::Input(format!("invalid request body: {err}")))
}

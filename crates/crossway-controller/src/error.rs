//! Error types for the controller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crossway_proto::ProtocolError;
use serde::Serialize;
use thiserror::Error;

/// Controller errors.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Request named a lane that does not exist.
    #[error("invalid lane: {0}")]
    InvalidLane(#[from] ProtocolError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Actuator link error.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Telemetry delivery error.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLane(_) => StatusCode::BAD_REQUEST,
            Self::Link(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Telemetry(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            Self::InvalidLane(e) => e.to_string(),
            Self::Link(_) => "actuator unavailable".to_owned(),
            Self::Config(_) | Self::Telemetry(_) | Self::Io(_) => "internal error".to_owned(),
        };

        (status, Json(ErrorBody { ok: false, error })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

/// Actuator link errors.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The command could not be written even after reconnecting.
    #[error("failed to write {command} after reconnect: {source}")]
    Write {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Telemetry sink errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// HTTP request failed or returned an error status.
    #[error("telemetry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Sink endpoint is not usable.
    #[error("invalid telemetry endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lane_is_client_error() {
        let err = ControllerError::from(ProtocolError::LaneOutOfRange(7));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid lane: lane index out of range: 7");
    }

    #[test]
    fn link_error_names_command() {
        let err = LinkError::Write {
            command: "ALL:R".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert!(err.to_string().starts_with("failed to write ALL:R"));
        assert_eq!(
            ControllerError::from(err).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

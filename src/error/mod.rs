use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Cluster error: {0}")]
    Cluster(#[from] crate::cluster::TransportError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let log_message = self.to_string();
        let (status, code, client_message) = match &self {
            AppError::Metrics(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "METRICS_ERROR",
                "Internal server error",
            ),
            AppError::Cluster(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CLUSTER_ERROR",
                "Service temporarily unavailable",
            ),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "Request failed"
        );

        let message = if is_production() {
            client_message.to_string()
        } else {
            log_message
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_error_status() {
        let err = AppError::from(prometheus::Error::Msg("encoder failed".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cluster_error_status() {
        let err = AppError::from(crate::cluster::TransportError::StreamEnded);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

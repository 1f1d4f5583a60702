//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// JSON body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            error: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // The backend failed, not the client
            AppError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use wizard_lib::WizardError;

/// JSON body of every non-2xx API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

/// Engine error on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub WizardError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            WizardError::NotFound { .. } => StatusCode::NOT_FOUND,
            WizardError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            WizardError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WizardError::InvalidCatalog(_)
            | WizardError::InvalidInventory(_)
            | WizardError::Io(_)
            | WizardError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        let status = self.status_code();
        ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.0.to_string(),
            code: self.0.code().to_string(),
            field: self.0.field().map(str::to_string),
            retryable: self.0.is_retryable(),
        }
    }
}

impl From<WizardError> for ApiError {
    fn from(err: WizardError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.body();

        match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                warn!(code = %body.code, message = %body.message, "Upstream unavailable")
            }
            s if s.is_server_error() => {
                error!(code = %body.code, message = %body.message, "Request failed")
            }
            _ => info!(code = %body.code, message = %body.message, "Request rejected"),
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError(WizardError::NotFound {
            kind: "preset",
            id: "x".into(),
        });
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid = ApiError(WizardError::invalid_request("zone", "empty"));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let upstream = ApiError(WizardError::upstream("kube-inventory", "timed out"));
        assert_eq!(upstream.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let inventory = ApiError(WizardError::InvalidInventory("counts".into()));
        assert_eq!(inventory.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_body_carries_field_and_retryable() {
        let body = ApiError(WizardError::invalid_request("customizations.weight", "out of range")).body();
        assert_eq!(body.error, "Bad Request");
        assert_eq!(body.code, "INVALID_REQUEST");
        assert_eq!(body.field.as_deref(), Some("customizations.weight"));
        assert!(!body.retryable);

        let body = ApiError(WizardError::upstream("file-pricing", "missing")).body();
        assert!(body.retryable);
        assert!(body.field.is_none());
    }
}

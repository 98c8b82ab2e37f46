use std::error::Error as StdError;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use pagesmith_api_types::{ErrorBody, QuotaExceededBody};
use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError};

/// Diagnostic detail attached to failed responses for the logging middleware.
///
/// Never serialized to clients.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadReference(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("daily limit of {limit} documents reached")]
    QuotaExceeded {
        limit: u32,
        retry_after_seconds: u64,
    },
    #[error("assembly failed: {0}")]
    AssemblyFailure(String),
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn bad_reference(message: impl Into<String>) -> Self {
        Self::BadReference(message.into())
    }

    pub fn assembly_failure(message: impl Into<String>) -> Self {
        Self::AssemblyFailure(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadReference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AssemblyFailure(_) | AppError::Infra(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Client-caused errors keep their detail;
    /// server-side failures collapse to a generic sentence.
    fn presentation_message(&self) -> String {
        match self {
            AppError::Validation(message)
            | AppError::BadReference(message)
            | AppError::PayloadTooLarge(message) => message.clone(),
            AppError::QuotaExceeded { .. } | AppError::NotFound => self.to_string(),
            AppError::AssemblyFailure(_) => "The document could not be assembled".to_string(),
            AppError::Infra(InfraError::Database { .. }) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Infra(_) | AppError::Unexpected(_) => {
                "Unexpected error occurred".to_string()
            }
        }
    }
}

impl From<DomainError> for AppError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => AppError::Validation(message),
            DomainError::OutOfRange { .. } => AppError::Validation(error.to_string()),
            DomainError::NotFound { .. } => AppError::NotFound,
            DomainError::Invariant { message } => AppError::Unexpected(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);

        let mut response = match &self {
            AppError::QuotaExceeded {
                retry_after_seconds,
                ..
            } => {
                let mut response = (
                    status,
                    Json(QuotaExceededBody {
                        error: message,
                        remaining: 0,
                        retry_after_seconds: *retry_after_seconds,
                    }),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
                response
            }
            _ => (status, Json(ErrorBody { error: message })).into_response(),
        };
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_failures_hide_their_cause() {
        let error = AppError::assembly_failure("xref table broken at /tmp/upload-123");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.presentation_message().contains("/tmp"));
    }

    #[test]
    fn client_failures_keep_their_detail() {
        let error = AppError::bad_reference("reference 2 points at unknown slot `b`");
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error.presentation_message().contains("unknown slot"));
    }

    #[test]
    fn quota_response_carries_retry_after() {
        let response = AppError::QuotaExceeded {
            limit: 3,
            retry_after_seconds: 90,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("90")
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn out_of_range_maps_to_validation() {
        let error = AppError::from(DomainError::out_of_range(4, 2));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }
}

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::application::users::{CommandError, ReadError};
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;
use crate::infra::http::error::{ApiError, codes};

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

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Public classification of an error: status, symbolic code and a fixed
/// message that never carries internal detail.
type Classification = (StatusCode, &'static str, &'static str);

const NOT_FOUND: Classification = (StatusCode::NOT_FOUND, codes::NOT_FOUND, "Resource not found");
const TIMEOUT: Classification = (
    StatusCode::GATEWAY_TIMEOUT,
    codes::TIMEOUT,
    "Request timed out",
);
const INTERNAL: Classification = (
    StatusCode::INTERNAL_SERVER_ERROR,
    codes::INTERNAL,
    "Unexpected error occurred",
);
const BAD_REQUEST: Classification = (
    StatusCode::BAD_REQUEST,
    codes::BAD_REQUEST,
    "Request could not be processed",
);

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    fn classify(&self) -> Classification {
        match self {
            AppError::Domain(err) => classify_domain(err),
            AppError::Read(err) => classify_read(err),
            AppError::Command(CommandError::Domain(err)) => classify_domain(err),
            AppError::Command(CommandError::Read(err)) => classify_read(err),
            AppError::Command(CommandError::Repo {
                source: RepoError::Duplicate { .. },
                ..
            }) => (StatusCode::CONFLICT, codes::DUPLICATE, "Duplicate record"),
            AppError::Command(CommandError::Repo { .. }) => INTERNAL,
            AppError::Validation(_) => BAD_REQUEST,
            AppError::Infra(_) | AppError::Unexpected(_) => INTERNAL,
        }
    }
}

fn classify_domain(err: &DomainError) -> Classification {
    match err {
        DomainError::NotFound { .. } => NOT_FOUND,
        DomainError::Validation { .. } => BAD_REQUEST,
        DomainError::CannotFollowSelf => (
            StatusCode::BAD_REQUEST,
            codes::CANNOT_FOLLOW_SELF,
            "Users cannot follow themselves",
        ),
        DomainError::Invariant { .. } => INTERNAL,
    }
}

fn classify_read(err: &ReadError) -> Classification {
    match err {
        ReadError::NotFound { .. } => NOT_FOUND,
        ReadError::Timeout { .. } => TIMEOUT,
        ReadError::Cache { .. }
        | ReadError::Origin { .. }
        | ReadError::Aborted(_)
        | ReadError::Invariant(_) => INTERNAL,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = ApiError::new(status, code, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;

    #[test]
    fn not_found_maps_to_404_from_every_layer() {
        let read = AppError::from(ReadError::user_not_found(1));
        let domain = AppError::from(DomainError::not_found("user"));
        let command = AppError::from(CommandError::from(ReadError::user_not_found(2)));
        for err in [read, domain, command] {
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = AppError::from(ReadError::Timeout {
            operation: "batch_profiles",
            deadline_ms: 3_000,
        });
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn infrastructure_failures_are_internal() {
        let err = AppError::from(ReadError::Cache {
            stage: "lookup",
            key: "user:base:1".to_string(),
            source: CacheError::Connection("refused".to_string()),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn self_follow_is_a_client_error() {
        let err = AppError::from(CommandError::from(DomainError::CannotFollowSelf));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}

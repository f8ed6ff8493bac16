//! Unified error handling for the sync API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::provider::ProviderError;
use crate::services::AccountError;
use crate::sync::SyncError;

/// Application-level error type for the sync API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Provider API operation failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::CredentialNotFound
            | AccountError::CredentialExpired
            | AccountError::LastDefaultAccount => Self::Conflict(err.to_string()),
            AccountError::EmptyUsername => Self::BadRequest(err.to_string()),
            AccountError::Repository(e) => Self::Database(e),
            AccountError::Provider(e) => Self::Provider(e),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::ConcurrentSweepRejected | SyncError::AlreadyHandedOff(_) => {
                Self::Conflict(err.to_string())
            }
            SyncError::OrderNotFound(key) => Self::NotFound(format!("order {key}")),
            SyncError::NotPermitted(_) => Self::Forbidden(err.to_string()),
            SyncError::Account(e) => e.into(),
            SyncError::Provider(e) => Self::Provider(e),
            SyncError::Repository(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Provider(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Sync API request error"
            );
        }

        let status = match &self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(
                ProviderError::AuthenticationFailed(_) | ProviderError::TokenExpired,
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Provider(ProviderError::RateLimited(_) | ProviderError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Provider(ProviderError::AuthenticationFailed(_)) => {
                "Provider rejected the credentials".to_string()
            }
            Self::Provider(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Set the Sentry user context from the acting staff member.
pub fn set_sentry_user(user_id: i32, role: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
        scope.set_tag("staff_role", role);
    });
}

#[cfg(test)]
mod tests {
    use dispatch_sync_core::OrderId;

    use super::*;

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order RY-1".to_string());
        assert_eq!(err.to_string(), "Not found: order RY-1");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(ProviderError::RateLimited(30)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(ProviderError::Api("bad".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_domain_errors_map_to_client_statuses() {
        assert_eq!(
            get_status(AccountError::LastDefaultAccount),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AccountError::EmptyUsername),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(SyncError::OrderNotFound("RY-1".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(SyncError::NotPermitted(OrderId::new(3))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(SyncError::Account(AccountError::CredentialExpired)),
            StatusCode::CONFLICT
        );
    }
}

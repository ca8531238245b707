//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as a JSON body
//! `{"message": "..."}`; server-side failures are captured to Sentry and their
//! details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use marketplace_core::pagination::CursorError;

use crate::db::RepositoryError;
use crate::services::checkout::CheckoutError;
use crate::services::idempotency::IdempotencyError;
use crate::services::ledger::OrderError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Checkout pipeline failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order read or transition failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Too many requests")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CursorError> for AppError {
    fn from(err: CursorError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<IdempotencyError> for AppError {
    fn from(err: IdempotencyError) -> Self {
        Self::Checkout(CheckoutError::Idempotency(err))
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn repository_status(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "Conflict".to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
    }
}

fn order_status(err: &OrderError) -> (StatusCode, String) {
    match err {
        OrderError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        OrderError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
        OrderError::NotCancellable(_)
        | OrderError::InvalidTransition(_)
        | OrderError::ConcurrentModification
        | OrderError::DuplicateIdempotencyKey => (StatusCode::CONFLICT, err.to_string()),
        OrderError::Repository(e) => repository_status(e),
        OrderError::OrderNumberExhausted(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
    }
}

fn checkout_status(err: &CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::Idempotency(IdempotencyError::Storage(e)) | CheckoutError::Repository(e) => {
            repository_status(e)
        }
        CheckoutError::Idempotency(_) | CheckoutError::Snapshot(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutError::Order(e) => order_status(e),
        CheckoutError::Render(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
        CheckoutError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
    }
}

impl AppError {
    /// Status code and client-safe message.
    #[must_use]
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(e) => repository_status(e),
            Self::Checkout(e) => checkout_status(e),
            Self::Order(e) => order_status(e),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Order placed", Some(&[("order_number", "RE-...")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use marketplace_core::OrderStatus;
    use marketplace_core::cart::SnapshotError;
    use marketplace_core::order::OrderValidationError;

    use super::*;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    fn message(err: &AppError) -> String {
        err.status_and_message().1
    }

    #[test]
    fn test_checkout_client_errors() {
        let missing_key = AppError::from(IdempotencyError::MissingKey);
        assert_eq!(message(&missing_key), "Idempotency-Key header required");
        assert_eq!(status(missing_key), StatusCode::BAD_REQUEST);

        let empty = AppError::Checkout(CheckoutError::Snapshot(SnapshotError::EmptyCart));
        assert_eq!(message(&empty), "Cart empty");
        assert_eq!(status(empty), StatusCode::BAD_REQUEST);

        let no_address = AppError::Checkout(CheckoutError::Order(OrderError::Validation(
            OrderValidationError::MissingShippingAddress,
        )));
        assert_eq!(message(&no_address), "Shipping address required");
        assert_eq!(status(no_address), StatusCode::BAD_REQUEST);

        assert_eq!(
            status(AppError::Checkout(CheckoutError::Timeout)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_order_errors() {
        let not_found = AppError::Order(OrderError::NotFound);
        assert_eq!(message(&not_found), "Order not found");
        assert_eq!(status(not_found), StatusCode::NOT_FOUND);

        assert_eq!(status(AppError::Order(OrderError::Forbidden)), StatusCode::FORBIDDEN);

        let conflict = AppError::Order(OrderError::NotCancellable(OrderStatus::Delivered));
        assert_eq!(message(&conflict), "Order not cancellable");
        assert_eq!(status(conflict), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".to_string()));
        assert_eq!(message(&err), INTERNAL_MESSAGE);
        assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::Order(OrderError::OrderNumberExhausted(5));
        assert_eq!(message(&err), INTERNAL_MESSAGE);
    }

    #[test]
    fn test_cursor_error_is_bad_request() {
        let err = AppError::from(CursorError);
        assert_eq!(message(&err), "Invalid cursor");
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_simple_variants() {
        assert_eq!(
            status(AppError::Unauthorized("Authentication required".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Outcomes of the admission engine. Every variant is surfaced to the caller
/// as its own status/code pair; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Requested time overlaps an existing booking")]
    SlotConflict,

    #[error("Requested time overlaps a blocked maintenance window")]
    SlotBlocked,

    #[error("Not allowed to cancel this booking")]
    Forbidden,

    #[error("Booking has already started or is in the past")]
    AlreadyPast,

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    #[error("Store unavailable: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            BookingError::InvalidInterval(_) => (StatusCode::BAD_REQUEST, "invalid_interval"),
            BookingError::SlotConflict => (StatusCode::CONFLICT, "slot_conflict"),
            BookingError::SlotBlocked => (StatusCode::CONFLICT, "slot_blocked"),
            BookingError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            BookingError::AlreadyPast => (StatusCode::UNPROCESSABLE_ENTITY, "already_past"),
            BookingError::AlreadyCancelled => (StatusCode::CONFLICT, "already_cancelled"),
            BookingError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        }
    }
}

impl AppError {
    /// Unique-constraint violations become `Conflict(message)`; anything else
    /// stays a database error.
    pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(message.to_string())
            }
            _ => AppError::Database(err),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests".to_string(),
            ),
            AppError::Booking(err) => {
                let (status, code) = err.status_and_code();
                let message = match err {
                    BookingError::Storage(e) => {
                        tracing::error!("Booking store error: {e}");
                        "Booking store unavailable".to_string()
                    }
                    other => other.to_string(),
                };
                (status, code, message)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            AppError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid token".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({ "error": message, "code": code });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_errors_keep_distinct_codes() {
        let cases = [
            (BookingError::NotFound("Court"), StatusCode::NOT_FOUND, "not_found"),
            (
                BookingError::InvalidInterval("start must be before end".into()),
                StatusCode::BAD_REQUEST,
                "invalid_interval",
            ),
            (BookingError::SlotConflict, StatusCode::CONFLICT, "slot_conflict"),
            (BookingError::SlotBlocked, StatusCode::CONFLICT, "slot_blocked"),
            (BookingError::Forbidden, StatusCode::FORBIDDEN, "forbidden"),
            (BookingError::AlreadyPast, StatusCode::UNPROCESSABLE_ENTITY, "already_past"),
            (BookingError::AlreadyCancelled, StatusCode::CONFLICT, "already_cancelled"),
            (
                BookingError::Storage(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[test]
    fn storage_failures_hide_driver_text() {
        let err = AppError::from(BookingError::Storage(sqlx::Error::PoolTimedOut));
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "store_unavailable");
        assert_eq!(message, "Booking store unavailable");
    }

    #[derive(Debug)]
    struct UniqueViolation;

    impl std::fmt::Display for UniqueViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for UniqueViolation {}

    impl sqlx::error::DatabaseError for UniqueViolation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some("23505".into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let err = sqlx::Error::Database(Box::new(UniqueViolation));
        let mapped = AppError::conflict_on_unique(err, "Email already registered");
        assert!(matches!(mapped, AppError::Conflict(ref m) if m == "Email already registered"));
        assert_eq!(mapped.parts().0, StatusCode::CONFLICT);

        let other = AppError::conflict_on_unique(sqlx::Error::PoolTimedOut, "unused");
        assert!(matches!(other, AppError::Database(_)));
    }

    #[test]
    fn response_carries_status() {
        let resp = AppError::Conflict("Email already registered".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}

/// Error types for feed-fanout-service
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedError {
    /// Store or broker outages that the next attempt may get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            FeedError::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            FeedError::Broker(_) => true,
            _ => false,
        }
    }
}

impl ResponseError for FeedError {
    fn status_code(&self) -> StatusCode {
        match self {
            FeedError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FeedError::Unauthorized => StatusCode::UNAUTHORIZED,
            FeedError::NotFound(_) => StatusCode::NOT_FOUND,
            FeedError::Database(_) | FeedError::Redis(_) | FeedError::Broker(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Store details stay in the logs
        let message = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("internal error")
                .to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            FeedError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(FeedError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            FeedError::Broker("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            FeedError::Config("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(FeedError::Broker("connection reset".into()).is_retryable());
        assert!(!FeedError::InvalidInput("self edge".into()).is_retryable());
        assert!(!FeedError::NotFound("post".into()).is_retryable());
    }
}

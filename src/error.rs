use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Failures of the message store core.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("message not found")]
    NotFound,
    #[error("attachment not found")]
    AttachmentNotFound,
    #[error("too many files (max {max})")]
    TooManyFiles { max: usize },
    #[error("file exceeds {max_bytes} bytes")]
    FileTooLarge { max_bytes: usize },
    #[error("attachment write failed: {0}")]
    StorageWrite(String),
    #[error("attachment read failed: {0}")]
    StorageRead(String),
    #[error("store query failed: {0}")]
    Query(String),
}

impl From<RepoError> for StoreError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => StoreError::NotFound,
            RepoError::Internal(msg) => StoreError::Query(msg),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("message not found")] NotFound,
    #[error("attachment not found")] AttachmentNotFound,
    #[error("payload too large")] PayloadTooLarge(String),
    #[error("internal error")] Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(_) | StoreError::TooManyFiles { .. } => ApiError::BadRequest(e.to_string()),
            StoreError::FileTooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            StoreError::NotFound => ApiError::NotFound,
            StoreError::AttachmentNotFound => ApiError::AttachmentNotFound,
            StoreError::StorageWrite(_) | StoreError::StorageRead(_) | StoreError::Query(_) => {
                // detail stays in the server log
                tracing::error!("request failed: {e}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound | ApiError::AttachmentNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        HttpResponse::build(status).json(ApiErrorBody { error })
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::CommentError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Comment(CommentError),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Comment(e) => match e {
                CommentError::Unauthenticated => StatusCode::UNAUTHORIZED,
                CommentError::NotFound(_) => StatusCode::NOT_FOUND,
                CommentError::InvalidThread => StatusCode::UNPROCESSABLE_ENTITY,
                CommentError::Forbidden => StatusCode::FORBIDDEN,
                CommentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CommentError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CommentError> for ApiError {
    fn from(e: CommentError) -> Self {
        ApiError::Comment(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Comment(e) => {
                if e.is_retryable() {
                    tracing::error!("Request failed: {}", e);
                }
                ErrorBody {
                    code: e.code(),
                    message: e.to_string(),
                }
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ErrorBody {
                    code: "internal",
                    message: "Internal server error".to_string(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

//! Maps `AppError` onto HTTP responses with a `{"message": ...}` body.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::AppError;
use serde_json::json;
use services::ValidationError;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError(pub AppError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self(AppError::Validation(err.body_text()))
    }
}

impl ApiError {
    /// A multipart body cut off by the body limit is an oversized image.
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self(AppError::ImageTooLarge { limit })
        } else {
            Self(AppError::Validation(err.body_text()))
        }
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) | AppError::NoNgWordMatch => StatusCode::BAD_REQUEST,
        AppError::Unauthorized(_) | AppError::AuthRequiredForImage => StatusCode::UNAUTHORIZED,
        AppError::ThreadNotFound(_) | AppError::PostNotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) | AppError::NicknameUnavailable(_) => StatusCode::CONFLICT,
        AppError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::UnsupportedImageFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AppError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
        AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "request rejected");
        }
        let message = match &self.0 {
            // Storage internals stay in the log.
            AppError::Persistence(_) => "internal server error".to_owned(),
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{PostId, ThreadId};

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NoNgWordMatch, StatusCode::BAD_REQUEST),
            (AppError::AuthRequiredForImage, StatusCode::UNAUTHORIZED),
            (AppError::ThreadNotFound(ThreadId::new()), StatusCode::NOT_FOUND),
            (AppError::PostNotFound(PostId::new()), StatusCode::NOT_FOUND),
            (AppError::ImageTooLarge { limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::UnsupportedImageFormat, StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (AppError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (AppError::UploadFailed("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Persistence("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err:?}");
        }
    }

    #[test]
    fn persistence_details_are_not_leaked() {
        let response = ApiError(AppError::Persistence("connection string".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

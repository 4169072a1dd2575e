//! # AppError
//!
//! Centralized error handling for the board.
//! Every failure the posting pipeline can produce maps to exactly one variant.

use thiserror::Error;

use crate::models::{PostId, ThreadId};

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Bad structural input or markup present. Nothing was mutated.
    #[error("validation error: {0}")]
    Validation(String),

    /// The source exhausted its window for this kind of request.
    #[error("too many requests: {0}")]
    RateLimited(String),

    #[error("an account is required to attach images")]
    AuthRequiredForImage,

    /// Missing, malformed, or rejected credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unsupported image format: only JPEG, PNG, GIF and WebP are accepted")]
    UnsupportedImageFormat,

    #[error("image too large: the limit is {limit} bytes")]
    ImageTooLarge { limit: usize },

    /// Object storage refused the upload. Nothing was persisted.
    #[error("image upload failed: {0}")]
    UploadFailed(String),

    #[error("nickname unavailable: {0}")]
    NicknameUnavailable(String),

    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("post not found: {0}")]
    PostNotFound(PostId),

    /// A report named no configured NG word, so it cannot authorize removal.
    #[error("the report does not contain an NG word")]
    NoNgWordMatch,

    /// Resource already exists (e.g., a post number taken twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage layer failure.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AppError {
    /// Stable, low-cardinality label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::RateLimited(_) => "rate_limited",
            AppError::AuthRequiredForImage => "auth_required_for_image",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::UnsupportedImageFormat => "unsupported_image_format",
            AppError::ImageTooLarge { .. } => "image_too_large",
            AppError::UploadFailed(_) => "upload_failed",
            AppError::NicknameUnavailable(_) => "nickname_unavailable",
            AppError::ThreadNotFound(_) => "thread_not_found",
            AppError::PostNotFound(_) => "post_not_found",
            AppError::NoNgWordMatch => "no_ng_word_match",
            AppError::Conflict(_) => "conflict",
            AppError::Persistence(_) => "persistence",
        }
    }
}

/// A specialized Result type for board logic.
pub type Result<T> = std::result::Result<T, AppError>;

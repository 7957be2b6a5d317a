//! Error taxonomy for the captioning pipeline.
//!
//! Only two variants ever cross the HTTP boundary: `InputValidation`
//! (malformed upload) and `Io` (upload could not be stored or metadata
//! could not be read). Everything model-related is absorbed by the
//! adapter and turned into a fallback result instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    /// Bad file extension or a missing upload field (400).
    #[error("invalid upload: {0}")]
    InputValidation(String),

    /// Unreadable image or resolution below the minimum.
    #[error("image preprocessing failed: {0}")]
    ImagePreprocessing(String),

    /// The captioning model could not be loaded at startup.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// A single invocation of the model failed.
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// The JSON caption artifact could not be written.
    #[error("failed to persist caption record: {0}")]
    Persistence(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for CaptionError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CaptionError::InputValidation(msg) => (StatusCode::BAD_REQUEST, msg),
            other => {
                tracing::error!("request failed: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, message).into_response()
    }
}

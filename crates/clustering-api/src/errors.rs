//! Error types and the JSON error envelope.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// Request-level API errors. Every variant maps to a stable error code; the
/// numeric failures inside the pipeline are recovered locally and never reach
/// this type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadInputFormat(String),
    #[error("{0}")]
    HeterogeneousInput(String),
    #[error("{0}")]
    InvalidEmbeddings(String),
    #[error("missing or invalid API token")]
    Unauthorized,
    #[error("{0}")]
    EncoderUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::BadInputFormat(_) => "BAD_INPUT_FORMAT",
            ApiError::HeterogeneousInput(_) => "HETEROGENEOUS_INPUT",
            ApiError::InvalidEmbeddings(_) => "INVALID_EMBEDDINGS",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::EncoderUnavailable(_) => "ENCODER_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::BadInputFormat(msg) => ApiError::BadInputFormat(msg),
            PipelineError::HeterogeneousInput(msg) => ApiError::HeterogeneousInput(msg),
            PipelineError::InvalidEmbeddings(msg) => ApiError::InvalidEmbeddings(msg),
            PipelineError::EncoderUnavailable(msg) => ApiError::EncoderUnavailable(msg),
            PipelineError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadInputFormat(_)
            | ApiError::HeterogeneousInput(_)
            | ApiError::InvalidEmbeddings(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::EncoderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());

        // 503s are retryable once the encoder finishes loading
        if matches!(self, ApiError::EncoderUnavailable(_)) {
            response.insert_header(("Retry-After", "5"));
        }

        response.json(ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        })
    }
}

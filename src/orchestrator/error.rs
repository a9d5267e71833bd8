use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("inference transport failed: {0}")]
    Transport(String),
    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response did not match the expected schema: {0}")]
    MalformedResponse(String),
    #[error("inference response was empty")]
    EmptyResponse,
    #[error("inference call exceeded {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("inference service is not configured")]
    InferenceUnavailable,
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

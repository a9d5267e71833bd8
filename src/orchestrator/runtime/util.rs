use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::timeout;

use crate::orchestrator::error::InferenceError;
use crate::orchestrator::traits::InferenceService;
use crate::orchestrator::types::InferenceRequest;

pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

pub(crate) fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_to_ms)
        .unwrap_or(0)
}

pub(crate) async fn call_inference(
    service: &dyn InferenceService,
    request: InferenceRequest,
    limit: Duration,
) -> Result<String, InferenceError> {
    match timeout(limit, service.generate(request)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(InferenceError::EmptyResponse),
        Ok(Ok(text)) => Ok(text.trim().to_string()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(InferenceError::Timeout(limit)),
    }
}

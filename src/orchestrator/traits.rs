use anyhow::Result;
use async_trait::async_trait;

use crate::orchestrator::error::InferenceError;
use crate::orchestrator::types::{DocumentKind, Fingerprint, InferenceRequest};

/// Multimodal text generation backend.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError>;
}

/// Read-only lookup of operator-managed prompt templates.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn active_template(&self, kind: DocumentKind) -> Result<Option<String>>;
}

/// Cheap content hash used to tell consecutive frames apart.
///
/// Identical payloads must produce identical fingerprints. Materially
/// different payloads should, in most cases, produce different ones.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, payload: &[u8]) -> Fingerprint;
}

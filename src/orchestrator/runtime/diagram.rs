//! Mermaid diagram rendering for the procedure document.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::orchestrator::error::InferenceError;
use crate::orchestrator::prompts::diagram_prompt;
use crate::orchestrator::traits::InferenceService;
use crate::orchestrator::types::{InferenceRequest, InferenceTask};

use super::util::call_inference;

const DIAGRAM_HEADERS: &[&str] = &[
    "flowchart",
    "graph",
    "sequenceDiagram",
    "stateDiagram",
    "stateDiagram-v2",
];

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("diagram output is not valid mermaid: {0}")]
    InvalidDiagram(String),
}

/// Mermaid source that passed a structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramCode(String);

impl DiagramCode {
    pub fn parse(raw: &str) -> Result<Self, DiagramError> {
        let code = strip_fence(raw.trim());

        let header = code.split_whitespace().next().unwrap_or_default();
        if !DIAGRAM_HEADERS.contains(&header) {
            return Err(DiagramError::InvalidDiagram(format!(
                "unexpected header `{header}`"
            )));
        }

        if code.lines().filter(|line| !line.trim().is_empty()).count() < 2 {
            return Err(DiagramError::InvalidDiagram(
                "diagram has no nodes".to_string(),
            ));
        }

        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`mermaid`) on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[derive(Clone)]
pub(crate) struct DiagramGenerator {
    inference: Arc<dyn InferenceService>,
    timeout: Duration,
}

impl DiagramGenerator {
    pub(crate) fn new(inference: Arc<dyn InferenceService>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    pub(crate) async fn generate(&self, document: &str) -> Result<DiagramCode, DiagramError> {
        let request = InferenceRequest::text(InferenceTask::Diagram, diagram_prompt(document));
        let raw = call_inference(self.inference.as_ref(), request, self.timeout).await?;
        DiagramCode::parse(&raw)
    }
}

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::orchestrator::constants::ERROR_BODY_PREVIEW_CHARS;
use crate::orchestrator::error::InferenceError;
use crate::orchestrator::traits::InferenceService;
use crate::orchestrator::types::InferenceRequest;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// `None` when `GEMINI_API_KEY` is unset or blank, which leaves the
    /// engine without an inference service.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;

        let mut config = Self::new(api_key.trim());
        if let Some(model) = non_empty_env("LIVEDOC_GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(endpoint) = non_empty_env("LIVEDOC_GEMINI_ENDPOINT") {
            config.endpoint = endpoint;
        }
        Some(config)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `InferenceService` over the Gemini `generateContent` REST API.
pub struct GeminiClient {
    agent: ureq::Agent,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            url: config.generate_url(),
            api_key: config.api_key,
        }
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let task = request.task.as_str();
        let body = serde_json::to_value(GenerateContentRequest::from(&request))
            .map_err(|err| InferenceError::Transport(format!("failed to encode request: {err}")))?;

        let agent = self.agent.clone();
        let url = self.url.clone();
        let api_key = self.api_key.clone();

        debug!(target: "gemini_client", task, "sending generateContent request");
        tokio::task::spawn_blocking(move || post_generate(&agent, &url, &api_key, body))
            .await
            .map_err(|err| InferenceError::Transport(format!("inference worker failed: {err}")))?
    }
}

fn post_generate(
    agent: &ureq::Agent,
    url: &str,
    api_key: &str,
    body: serde_json::Value,
) -> Result<String, InferenceError> {
    match agent.post(url).set("x-goog-api-key", api_key).send_json(body) {
        Ok(response) => {
            let text = response
                .into_string()
                .map_err(|err| InferenceError::Transport(err.to_string()))?;
            parse_response(&text)
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            warn!(target: "gemini_client", status, %body, "generateContent returned an error status");
            Err(InferenceError::Status { status, body })
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(InferenceError::Transport(transport.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<RequestContent>,
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<&InferenceRequest> for GenerateContentRequest {
    fn from(request: &InferenceRequest) -> Self {
        let system_instruction = request.system.as_ref().map(|system| RequestContent {
            role: None,
            parts: vec![RequestPart::Text(system.clone())],
        });

        let mut parts = vec![RequestPart::Text(request.prompt.clone())];
        if let Some(media) = &request.media {
            parts.push(RequestPart::InlineData(InlineData {
                mime_type: media.mime_type.clone(),
                data: BASE64.encode(&media.data),
            }));
        }

        Self {
            system_instruction,
            contents: vec![RequestContent {
                role: Some("user"),
                parts,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn parse_response(raw: &str) -> Result<String, InferenceError> {
    let response: GenerateContentResponse = serde_json::from_str(raw)
        .map_err(|err| InferenceError::MalformedResponse(err.to_string()))?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        warn!(target: "gemini_client", reason, "prompt was blocked");
        return Err(InferenceError::EmptyResponse);
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(InferenceError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        debug!(
            target: "gemini_client",
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "candidate carried no text"
        );
        return Err(InferenceError::EmptyResponse);
    }
    Ok(text)
}

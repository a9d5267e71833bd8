use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::orchestrator::constants::DEFAULT_SPEAKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Ui,
    Code,
    Document,
    Diagram,
    Presentation,
    Other,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Ui => "ui",
            ObservationKind::Code => "code",
            ObservationKind::Document => "document",
            ObservationKind::Diagram => "diagram",
            ObservationKind::Presentation => "presentation",
            ObservationKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Screen,
    Transcript,
}

impl ObservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationSource::Screen => "screen",
            ObservationSource::Transcript => "transcript",
        }
    }
}

/// A validated procedural action seen on screen or heard in the meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp_ms: u64,
    pub description: String,
    pub kind: ObservationKind,
    pub source: ObservationSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp_ms: u64,
    pub speaker: String,
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Procedure,
    RoleOutcomes,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Procedure, DocumentKind::RoleOutcomes];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Procedure => "procedure",
            DocumentKind::RoleOutcomes => "role_outcomes",
        }
    }

    /// Category key used to look up the active prompt template.
    pub fn template_category(&self) -> &'static str {
        match self {
            DocumentKind::Procedure => "sop_generation",
            DocumentKind::RoleOutcomes => "cro_generation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub content: String,
    pub version: u64,
    pub updated_at_ms: Option<u64>,
}

impl Document {
    pub fn empty(kind: DocumentKind) -> Self {
        Self {
            kind,
            content: String::new(),
            version: 0,
            updated_at_ms: None,
        }
    }
}

/// Where the caller keeps the durable record of a meeting, if anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordRef {
    Persisted {
        id: String,
    },
    #[default]
    Ephemeral,
}

/// Decoded image or audio bytes handed to the inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: Bytes,
}

/// Compact frame fingerprint compared between consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    pub front: u32,
    pub back: u32,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceTask {
    Extraction,
    Synthesis(DocumentKind),
    Diagram,
    Transcription,
    Chat,
}

impl InferenceTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceTask::Extraction => "extraction",
            InferenceTask::Synthesis(DocumentKind::Procedure) => "procedure_synthesis",
            InferenceTask::Synthesis(DocumentKind::RoleOutcomes) => "role_outcomes_synthesis",
            InferenceTask::Diagram => "diagram",
            InferenceTask::Transcription => "transcription",
            InferenceTask::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub task: InferenceTask,
    pub system: Option<String>,
    pub prompt: String,
    pub media: Option<MediaPayload>,
}

impl InferenceRequest {
    pub fn text(task: InferenceTask, prompt: impl Into<String>) -> Self {
        Self {
            task,
            system: None,
            prompt: prompt.into(),
            media: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_media(mut self, media: MediaPayload) -> Self {
        self.media = Some(media);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
    Ping,
}

fn default_image_mime() -> String {
    "image/jpeg".to_string()
}

fn default_audio_mime() -> String {
    "audio/webm".to_string()
}

fn default_speaker() -> String {
    DEFAULT_SPEAKER.to_string()
}

fn default_enabled() -> bool {
    true
}

/// Messages accepted by the engine, one meeting per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Control {
        meeting_id: String,
        action: ControlAction,
        #[serde(default)]
        record: RecordRef,
    },
    Video {
        meeting_id: String,
        data: String,
        #[serde(default = "default_image_mime")]
        mime_type: String,
    },
    Transcript {
        meeting_id: String,
        text: String,
        #[serde(default = "default_speaker")]
        speaker: String,
        #[serde(default)]
        is_final: bool,
        #[serde(default = "default_enabled")]
        generate_procedure: bool,
        #[serde(default = "default_enabled")]
        generate_role_outcomes: bool,
    },
    AudioTranscribe {
        meeting_id: String,
        data: String,
        #[serde(default = "default_audio_mime")]
        mime_type: String,
    },
    Text {
        meeting_id: String,
        text: String,
    },
}

impl InboundMessage {
    pub fn meeting_id(&self) -> &str {
        match self {
            InboundMessage::Control { meeting_id, .. }
            | InboundMessage::Video { meeting_id, .. }
            | InboundMessage::Transcript { meeting_id, .. }
            | InboundMessage::AudioTranscribe { meeting_id, .. }
            | InboundMessage::Text { meeting_id, .. } => meeting_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Control { .. } => "control",
            InboundMessage::Video { .. } => "video",
            InboundMessage::Transcript { .. } => "transcript",
            InboundMessage::AudioTranscribe { .. } => "audio_transcribe",
            InboundMessage::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Stopped,
    Pong,
    Observing,
    Skipped,
    Busy,
    ObservationRecorded,
    TranscriptBuffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisPhase {
    Generating,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSnapshot {
    pub content: String,
    pub observation_count: usize,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
    #[serde(default)]
    pub record: RecordRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<SynthesisPhase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleOutcomesSnapshot {
    pub content: String,
    pub version: u64,
    #[serde(default)]
    pub record: RecordRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<SynthesisPhase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundResult {
    Status {
        status: SessionStatus,
    },
    Text {
        text: String,
    },
    Transcript {
        text: String,
        speaker: String,
        is_final: bool,
    },
    SopUpdate(ProcedureSnapshot),
    SopStatus(ProcedureSnapshot),
    CroUpdate(RoleOutcomesSnapshot),
    CroStatus(RoleOutcomesSnapshot),
    Error {
        message: String,
    },
}

impl OutboundResult {
    pub fn status(status: SessionStatus) -> Self {
        OutboundResult::Status { status }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundResult::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineUpdate {
    pub meeting_id: String,
    #[serde(flatten)]
    pub result: OutboundResult,
}

impl EngineUpdate {
    pub fn new(meeting_id: impl Into<String>, result: OutboundResult) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            result,
        }
    }
}

/// Point-in-time view of one document track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSnapshot {
    pub kind: DocumentKind,
    pub content: String,
    pub version: u64,
    pub cursor: usize,
    pub in_flight: bool,
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub meeting_id: String,
    pub epoch: u64,
    pub observation_count: usize,
    pub transcript_entries: usize,
    pub frames_since_analysis: u32,
    pub record: RecordRef,
    pub procedure: DocumentSnapshot,
    pub role_outcomes: DocumentSnapshot,
}

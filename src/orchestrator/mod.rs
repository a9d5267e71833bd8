//! Live observation-to-document synthesis.

mod constants;
mod engine;
mod runtime;

pub mod config;
pub mod error;
pub mod prompts;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use engine::gemini::{GeminiClient, GeminiConfig};
pub use engine::{decode_media, LiveEngine};
pub use error::{EngineError, InferenceError};
pub use prompts::{DirectoryPromptStore, StaticPromptStore};
pub use runtime::diagram::{DiagramCode, DiagramError};
pub use runtime::extractor::Rejection;
pub use runtime::gate::SampledFoldFingerprinter;
pub use traits::{Fingerprinter, InferenceService, PromptStore};
pub use types::{
    ControlAction, Document, DocumentKind, DocumentSnapshot, EngineUpdate, InboundMessage,
    InferenceRequest, InferenceTask, Observation, ObservationKind, ObservationSource,
    OutboundResult, ProcedureSnapshot, RecordRef, RoleOutcomesSnapshot, SessionSnapshot,
    SessionStatus, SynthesisPhase, TranscriptEntry,
};

#[cfg(test)]
pub(crate) mod tests;

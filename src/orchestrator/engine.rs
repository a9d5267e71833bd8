pub mod gemini;

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::config::EngineConfig;
use crate::orchestrator::constants::AUDIO_SPEAKER;
use crate::orchestrator::error::{EngineError, InferenceError};
use crate::orchestrator::prompts::{extraction_prompt, CHAT_PERSONA, TRANSCRIPTION_PROMPT};
use crate::orchestrator::runtime::extractor::{interpret, ExtractionOutcome};
use crate::orchestrator::runtime::fusion::promote;
use crate::orchestrator::runtime::gate::{GateDecision, SampledFoldFingerprinter};
use crate::orchestrator::runtime::state::Session;
use crate::orchestrator::runtime::synthesizer::{try_begin, SynthesisJob, Synthesizer};
use crate::orchestrator::runtime::util::{call_inference, unix_time_ms};
use crate::orchestrator::runtime::{SessionRegistry, SessionSlot};
use crate::orchestrator::traits::{Fingerprinter, InferenceService, PromptStore};
use crate::orchestrator::types::{
    ControlAction, DocumentKind, EngineUpdate, InboundMessage, InferenceRequest, InferenceTask,
    MediaPayload, Observation, OutboundResult, RecordRef, SessionSnapshot, SessionStatus,
    TranscriptEntry,
};
use crate::telemetry::events::{record_extraction, record_frame_decision};

/// Per-meeting observation-to-document engine. Synthesized revisions arrive
/// on the receiver returned by the constructor.
#[derive(Clone)]
pub struct LiveEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<SessionRegistry>,
    inference: Option<Arc<dyn InferenceService>>,
    synthesizer: Option<Synthesizer>,
    fingerprinter: Arc<dyn Fingerprinter>,
}

struct TranscriptInput {
    text: String,
    speaker: String,
    is_final: bool,
    kinds: Vec<DocumentKind>,
}

impl LiveEngine {
    pub fn new(
        config: EngineConfig,
        inference: Option<Arc<dyn InferenceService>>,
        prompts: Arc<dyn PromptStore>,
    ) -> (Self, mpsc::Receiver<EngineUpdate>) {
        let fingerprinter = Arc::new(SampledFoldFingerprinter::new(config.fingerprint_stride));
        Self::with_components(config, inference, prompts, fingerprinter)
    }

    pub fn with_components(
        config: EngineConfig,
        inference: Option<Arc<dyn InferenceService>>,
        prompts: Arc<dyn PromptStore>,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> (Self, mpsc::Receiver<EngineUpdate>) {
        let (updates_tx, updates_rx) = mpsc::channel(config.update_buffer.max(1));
        let registry = Arc::new(SessionRegistry::new(config.clone()));
        let synthesizer = inference.as_ref().map(|inference| {
            Synthesizer::new(
                Arc::clone(inference),
                prompts,
                Arc::clone(&registry),
                updates_tx,
                config.inference_timeout,
            )
        });

        if inference.is_none() {
            warn!(
                target: "live_engine",
                "no inference service configured; frames, audio and chat will be rejected"
            );
        }

        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                inference,
                synthesizer,
                fingerprinter,
            }),
        };
        (engine, updates_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub async fn handle(&self, message: InboundMessage) -> Vec<EngineUpdate> {
        self.handle_at(message, Instant::now()).await
    }

    pub async fn handle_at(&self, message: InboundMessage, now: Instant) -> Vec<EngineUpdate> {
        let meeting_id = message.meeting_id().to_string();
        let kind = message.kind();

        let results = match self.dispatch(message, now).await {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    target: "live_engine",
                    meeting_id = %meeting_id,
                    message = kind,
                    %err,
                    "message handling failed"
                );
                vec![OutboundResult::error(err.to_string())]
            }
        };

        results
            .into_iter()
            .map(|result| EngineUpdate::new(meeting_id.clone(), result))
            .collect()
    }

    async fn dispatch(
        &self,
        message: InboundMessage,
        now: Instant,
    ) -> Result<Vec<OutboundResult>, EngineError> {
        match message {
            InboundMessage::Control {
                meeting_id,
                action,
                record,
            } => Ok(self.handle_control(&meeting_id, action, record, now).await),
            InboundMessage::Video {
                meeting_id,
                data,
                mime_type,
            } => self.handle_frame(&meeting_id, &data, &mime_type, now).await,
            InboundMessage::Transcript {
                meeting_id,
                text,
                speaker,
                is_final,
                generate_procedure,
                generate_role_outcomes,
            } => {
                let mut kinds = Vec::with_capacity(2);
                if generate_procedure {
                    kinds.push(DocumentKind::Procedure);
                }
                if generate_role_outcomes {
                    kinds.push(DocumentKind::RoleOutcomes);
                }
                let input = TranscriptInput {
                    text,
                    speaker,
                    is_final,
                    kinds,
                };
                Ok(self.ingest_transcript(&meeting_id, input, now).await)
            }
            InboundMessage::AudioTranscribe {
                meeting_id,
                data,
                mime_type,
            } => self.handle_audio(&meeting_id, &data, &mime_type).await,
            InboundMessage::Text { meeting_id, text } => {
                self.handle_chat(&meeting_id, &text, now).await
            }
        }
    }

    async fn handle_control(
        &self,
        meeting_id: &str,
        action: ControlAction,
        record: RecordRef,
        now: Instant,
    ) -> Vec<OutboundResult> {
        let status = match action {
            ControlAction::Start => {
                self.inner.registry.reset(meeting_id, record, now).await;
                SessionStatus::Started
            }
            ControlAction::Stop => {
                if !self.inner.registry.remove(meeting_id).await {
                    debug!(
                        target: "live_engine",
                        meeting_id,
                        "stop for unknown session"
                    );
                }
                SessionStatus::Stopped
            }
            ControlAction::Ping => {
                if let Some(slot) = self.inner.registry.get(meeting_id, now).await {
                    slot.lock().await.touch(now);
                }
                SessionStatus::Pong
            }
        };
        vec![OutboundResult::status(status)]
    }

    fn require_inference(&self) -> Result<Arc<dyn InferenceService>, EngineError> {
        self.inner
            .inference
            .clone()
            .ok_or(EngineError::InferenceUnavailable)
    }

    async fn handle_frame(
        &self,
        meeting_id: &str,
        data: &str,
        mime_type: &str,
        now: Instant,
    ) -> Result<Vec<OutboundResult>, EngineError> {
        let inference = self.require_inference()?;
        let media = decode_media("video", data, mime_type)?;
        let fingerprint = self.inner.fingerprinter.fingerprint(&media.data);
        let config = &self.inner.config;

        let slot = self.inner.registry.get_or_create(meeting_id, now).await;
        let previous = {
            let mut session = slot.lock().await;
            let decision = session.gate.evaluate(fingerprint, now, config);
            match decision {
                GateDecision::Skip { changed, wait } => {
                    session.gate.record_skip();
                    record_frame_decision(
                        meeting_id,
                        decision.label(),
                        changed,
                        session.gate.frames_since_analysis(),
                        Some(wait),
                    );
                    return Ok(vec![OutboundResult::status(SessionStatus::Skipped)]);
                }
                GateDecision::Accept { changed, .. } if session.extraction_in_flight => {
                    session.gate.record_skip();
                    record_frame_decision(
                        meeting_id,
                        "busy",
                        changed,
                        session.gate.frames_since_analysis(),
                        None,
                    );
                    return Ok(vec![OutboundResult::status(SessionStatus::Busy)]);
                }
                GateDecision::Accept { .. } => {
                    record_frame_decision(
                        meeting_id,
                        decision.label(),
                        decision.changed(),
                        session.gate.frames_since_analysis(),
                        None,
                    );
                    session.gate.commit_accept(fingerprint, now);
                    session.extraction_in_flight = true;
                    session.last_response.clone()
                }
            }
        };

        let started = Instant::now();
        let request =
            InferenceRequest::text(InferenceTask::Extraction, extraction_prompt(previous.as_deref()))
                .with_media(media);
        let reply = call_inference(inference.as_ref(), request, config.inference_timeout).await;

        self.finish_extraction(&slot, previous, reply, now, started)
            .await
    }

    async fn finish_extraction(
        &self,
        slot: &Arc<SessionSlot>,
        previous: Option<String>,
        reply: Result<String, InferenceError>,
        now: Instant,
        started: Instant,
    ) -> Result<Vec<OutboundResult>, EngineError> {
        let meeting_id = slot.meeting_id();
        let live = self
            .inner
            .registry
            .is_current(meeting_id, slot.epoch())
            .await;

        let mut session = slot.lock().await;
        session.extraction_in_flight = false;

        if !live || !session.active {
            info!(
                target: "live_engine",
                meeting_id,
                epoch = slot.epoch(),
                "session stopped or replaced; discarding extraction result"
            );
            return Ok(Vec::new());
        }

        let response = match reply {
            Ok(response) => response,
            Err(InferenceError::EmptyResponse) => String::new(),
            Err(err) => {
                record_extraction(
                    meeting_id,
                    "failed",
                    started.elapsed(),
                    session.observations().len(),
                );
                return Err(err.into());
            }
        };

        let outcome = interpret(
            &response,
            previous.as_deref(),
            self.inner.config.similarity_threshold,
            unix_time_ms(),
        );

        let label = match &outcome {
            ExtractionOutcome::NothingVisible => "nothing_visible",
            ExtractionOutcome::Duplicate { similarity } => {
                debug!(
                    target: "live_engine",
                    meeting_id,
                    similarity,
                    "extraction repeats the previous action"
                );
                "duplicate"
            }
            ExtractionOutcome::Rejected(rejection) => {
                debug!(
                    target: "live_engine",
                    meeting_id,
                    %rejection,
                    "extraction not promoted to an observation"
                );
                "rejected"
            }
            ExtractionOutcome::Recorded(_) => "recorded",
        };

        if matches!(
            outcome,
            ExtractionOutcome::Rejected(_) | ExtractionOutcome::Recorded(_)
        ) {
            session.last_response = Some(response);
        }

        let status = match outcome {
            ExtractionOutcome::Recorded(observation) => {
                session.push_observation(observation);
                SessionStatus::ObservationRecorded
            }
            _ => SessionStatus::Observing,
        };
        record_extraction(
            meeting_id,
            label,
            started.elapsed(),
            session.observations().len(),
        );

        let jobs = self.begin_synthesis(slot, &mut session, &DocumentKind::ALL, now);
        drop(session);

        let mut results = vec![OutboundResult::status(status)];
        results.extend(self.launch(jobs));
        Ok(results)
    }

    async fn ingest_transcript(
        &self,
        meeting_id: &str,
        input: TranscriptInput,
        now: Instant,
    ) -> Vec<OutboundResult> {
        let text = input.text.trim();
        if text.is_empty() {
            debug!(target: "live_engine", meeting_id, "ignoring blank transcript fragment");
            return Vec::new();
        }

        let slot = self.inner.registry.get_or_create(meeting_id, now).await;
        let mut session = slot.lock().await;

        let entry = TranscriptEntry {
            timestamp_ms: unix_time_ms(),
            speaker: input.speaker,
            text: text.to_string(),
            is_final: input.is_final,
        };
        if let Some(observation) = promote(&entry) {
            debug!(
                target: "live_engine",
                meeting_id,
                kind = observation.kind.as_str(),
                "promoted transcript fragment to observation"
            );
            session.push_observation(observation);
        }
        if session.transcript.push(entry).is_some() {
            debug!(target: "live_engine", meeting_id, "transcript buffer full; evicted oldest entry");
        }

        let jobs = self.begin_synthesis(&slot, &mut session, &input.kinds, now);
        drop(session);

        let mut results = vec![OutboundResult::status(SessionStatus::TranscriptBuffered)];
        results.extend(self.launch(jobs));
        results
    }

    async fn handle_audio(
        &self,
        meeting_id: &str,
        data: &str,
        mime_type: &str,
    ) -> Result<Vec<OutboundResult>, EngineError> {
        let inference = self.require_inference()?;
        let media = decode_media("audio", data, mime_type)?;

        let request =
            InferenceRequest::text(InferenceTask::Transcription, TRANSCRIPTION_PROMPT).with_media(media);
        let text = match call_inference(
            inference.as_ref(),
            request,
            self.inner.config.inference_timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(InferenceError::EmptyResponse) => {
                debug!(target: "live_engine", meeting_id, "audio clip contained no speech");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        Ok(vec![OutboundResult::Transcript {
            text,
            speaker: AUDIO_SPEAKER.to_string(),
            is_final: true,
        }])
    }

    async fn handle_chat(
        &self,
        meeting_id: &str,
        text: &str,
        now: Instant,
    ) -> Result<Vec<OutboundResult>, EngineError> {
        let inference = self.require_inference()?;
        if text.trim().is_empty() {
            return Err(EngineError::InvalidPayload {
                kind: "text",
                reason: "message is empty".to_string(),
            });
        }

        let procedure = match self.inner.registry.get(meeting_id, now).await {
            Some(slot) => slot
                .lock()
                .await
                .track(DocumentKind::Procedure)
                .document
                .content
                .clone(),
            None => String::new(),
        };

        let mut system = CHAT_PERSONA.to_string();
        if !procedure.trim().is_empty() {
            system.push_str("\n\nThe procedure captured so far:\n");
            system.push_str(procedure.trim());
        }

        let request = InferenceRequest::text(InferenceTask::Chat, text.trim()).with_system(system);
        let reply = call_inference(
            inference.as_ref(),
            request,
            self.inner.config.inference_timeout,
        )
        .await?;
        Ok(vec![OutboundResult::Text { text: reply }])
    }

    fn begin_synthesis(
        &self,
        slot: &Arc<SessionSlot>,
        session: &mut Session,
        kinds: &[DocumentKind],
        now: Instant,
    ) -> Vec<SynthesisJob> {
        if self.inner.synthesizer.is_none() {
            return Vec::new();
        }
        kinds
            .iter()
            .filter_map(|kind| try_begin(*kind, slot, session, now, &self.inner.config))
            .collect()
    }

    fn launch(&self, jobs: Vec<SynthesisJob>) -> Vec<OutboundResult> {
        let Some(synthesizer) = &self.inner.synthesizer else {
            return Vec::new();
        };

        jobs.into_iter()
            .map(|job| {
                let status = job.generating_status();
                debug!(
                    target: "live_engine",
                    document = job.kind().as_str(),
                    "spawning synthesis"
                );
                tokio::spawn(synthesizer.clone().run(job));
                status
            })
            .collect()
    }

    pub async fn end_meeting(&self, meeting_id: &str) -> bool {
        self.inner.registry.remove(meeting_id).await
    }

    pub async fn snapshot(&self, meeting_id: &str) -> Option<SessionSnapshot> {
        self.lookup(meeting_id, Instant::now()).await
    }

    pub async fn lookup(&self, meeting_id: &str, now: Instant) -> Option<SessionSnapshot> {
        let slot = self.inner.registry.get(meeting_id, now).await?;
        let snapshot = slot.lock().await.snapshot();
        Some(snapshot)
    }

    pub async fn observations(&self, meeting_id: &str) -> Option<Vec<Observation>> {
        let slot = self.inner.registry.get(meeting_id, Instant::now()).await?;
        let observations = slot.lock().await.observations().to_vec();
        Some(observations)
    }

    pub async fn active_sessions(&self) -> usize {
        self.inner.registry.len().await
    }

    pub async fn reap_idle(&self, now: Instant) -> Vec<String> {
        self.inner.registry.reap_expired(now).await
    }

    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let inner: Weak<EngineInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let reaped = inner.registry.reap_expired(Instant::now()).await;
                if !reaped.is_empty() {
                    info!(
                        target: "live_engine",
                        count = reaped.len(),
                        "idle sessions reaped"
                    );
                }
            }
        })
    }
}

/// Decodes base64 media, accepting either a bare payload or a `data:` URL.
/// A MIME type embedded in the data URL wins over `mime_type`.
pub fn decode_media(
    kind: &'static str,
    data: &str,
    mime_type: &str,
) -> Result<MediaPayload, EngineError> {
    let invalid = |reason: String| EngineError::InvalidPayload { kind, reason };

    let (mime_type, encoded) = match data.trim().strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| invalid("data URL has no payload".to_string()))?;
            let embedded = header.split(';').next().unwrap_or_default();
            let mime = if embedded.is_empty() { mime_type } else { embedded };
            (mime, body)
        }
        None => (mime_type, data.trim()),
    };

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| invalid(err.to_string()))?;
    if bytes.is_empty() {
        return Err(invalid("payload is empty".to_string()));
    }

    Ok(MediaPayload {
        mime_type: mime_type.to_string(),
        data: Bytes::from(bytes),
    })
}

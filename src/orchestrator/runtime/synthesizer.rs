//! Living document synthesis: trigger policy, job hand-off and commit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::orchestrator::config::EngineConfig;
use crate::orchestrator::prompts::{default_template, synthesis_prompt};
use crate::orchestrator::traits::{InferenceService, PromptStore};
use crate::orchestrator::types::{
    DocumentKind, EngineUpdate, InferenceRequest, InferenceTask, Observation, OutboundResult,
    ProcedureSnapshot, RecordRef, RoleOutcomesSnapshot, SynthesisPhase, TranscriptEntry,
};
use crate::telemetry::events::record_synthesis;

use super::diagram::DiagramGenerator;
use super::state::Session;
use super::util::{call_inference, unix_time_ms};
use super::{SessionRegistry, SessionSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerReason {
    Observations,
    Transcript,
}

impl TriggerReason {
    fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Observations => "observations",
            TriggerReason::Transcript => "transcript",
        }
    }
}

pub(crate) fn evaluate_trigger(
    kind: DocumentKind,
    session: &Session,
    now: Instant,
    config: &EngineConfig,
) -> Option<TriggerReason> {
    let track = session.track(kind);
    let pending = track.pending(session.observations().len());
    let transcript_chars = session.transcript.total_chars();

    match kind {
        DocumentKind::Procedure => {
            if pending >= config.procedure_min_observations
                && track.since_last_synthesis(now) >= config.procedure_min_interval
            {
                Some(TriggerReason::Observations)
            } else if session.transcript.len() >= config.procedure_min_transcript_entries
                && transcript_chars > config.transcript_min_chars
            {
                Some(TriggerReason::Transcript)
            } else {
                None
            }
        }
        DocumentKind::RoleOutcomes => {
            if pending >= config.role_outcomes_min_observations {
                Some(TriggerReason::Observations)
            } else if transcript_chars > config.transcript_min_chars {
                Some(TriggerReason::Transcript)
            } else {
                None
            }
        }
    }
}

pub(crate) struct SynthesisJob {
    slot: Arc<SessionSlot>,
    kind: DocumentKind,
    reason: TriggerReason,
    triggered_at: Instant,
    existing: String,
    version: u64,
    observations: Vec<Observation>,
    transcript: Vec<TranscriptEntry>,
    consumed_to: usize,
    record: RecordRef,
}

impl SynthesisJob {
    pub(crate) fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub(crate) fn generating_status(&self) -> OutboundResult {
        document_result(
            self.kind,
            self.existing.clone(),
            self.version,
            self.consumed_to,
            None,
            self.record.clone(),
            Some(SynthesisPhase::Generating),
        )
    }
}

pub(crate) fn try_begin(
    kind: DocumentKind,
    slot: &Arc<SessionSlot>,
    session: &mut Session,
    now: Instant,
    config: &EngineConfig,
) -> Option<SynthesisJob> {
    let reason = evaluate_trigger(kind, session, now, config)?;

    if !session.track_mut(kind).try_claim() {
        debug!(
            target: "synthesizer",
            meeting_id = %session.meeting_id,
            document = kind.as_str(),
            "synthesis already in flight; trigger dropped"
        );
        return None;
    }

    let consumed_to = session.observations().len();
    let track = session.track(kind);
    let cursor = track.cursor();
    let existing = track.document.content.clone();
    let version = track.document.version;

    Some(SynthesisJob {
        slot: Arc::clone(slot),
        kind,
        reason,
        triggered_at: now,
        existing,
        version,
        observations: session.observations()[cursor..consumed_to].to_vec(),
        transcript: session.transcript.to_vec(),
        consumed_to,
        record: session.record.clone(),
    })
}

pub(crate) fn document_result(
    kind: DocumentKind,
    content: String,
    version: u64,
    observation_count: usize,
    diagram: Option<String>,
    record: RecordRef,
    phase: Option<SynthesisPhase>,
) -> OutboundResult {
    match kind {
        DocumentKind::Procedure => {
            let snapshot = ProcedureSnapshot {
                content,
                observation_count,
                version,
                diagram,
                record,
                phase,
            };
            if phase.is_some() {
                OutboundResult::SopStatus(snapshot)
            } else {
                OutboundResult::SopUpdate(snapshot)
            }
        }
        DocumentKind::RoleOutcomes => {
            let snapshot = RoleOutcomesSnapshot {
                content,
                version,
                record,
                phase,
            };
            if phase.is_some() {
                OutboundResult::CroStatus(snapshot)
            } else {
                OutboundResult::CroUpdate(snapshot)
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct Synthesizer {
    inference: Arc<dyn InferenceService>,
    prompts: Arc<dyn PromptStore>,
    registry: Arc<SessionRegistry>,
    updates: mpsc::Sender<EngineUpdate>,
    diagrams: DiagramGenerator,
    timeout: Duration,
}

impl Synthesizer {
    pub(crate) fn new(
        inference: Arc<dyn InferenceService>,
        prompts: Arc<dyn PromptStore>,
        registry: Arc<SessionRegistry>,
        updates: mpsc::Sender<EngineUpdate>,
        timeout: Duration,
    ) -> Self {
        let diagrams = DiagramGenerator::new(Arc::clone(&inference), timeout);
        Self {
            inference,
            prompts,
            registry,
            updates,
            diagrams,
            timeout,
        }
    }

    pub(crate) async fn run(self, job: SynthesisJob) {
        let started = Instant::now();
        let meeting_id = job.slot.meeting_id().to_string();
        info!(
            target: "synthesizer",
            meeting_id = %meeting_id,
            document = job.kind.as_str(),
            reason = job.reason.as_str(),
            new_observations = job.observations.len(),
            transcript_entries = job.transcript.len(),
            "starting synthesis"
        );

        let template = self.resolve_template(job.kind).await;
        let prompt = synthesis_prompt(
            &template,
            job.kind,
            &job.existing,
            job.version,
            &job.observations,
            &job.transcript,
        );
        let request = InferenceRequest::text(InferenceTask::Synthesis(job.kind), prompt);

        match call_inference(self.inference.as_ref(), request, self.timeout).await {
            Ok(content) => self.apply(job, content, started).await,
            Err(err) => {
                warn!(
                    target: "synthesizer",
                    meeting_id = %meeting_id,
                    document = job.kind.as_str(),
                    %err,
                    "synthesis failed; document left unchanged"
                );
                self.fail(job, err.to_string(), started).await;
            }
        }
    }

    async fn resolve_template(&self, kind: DocumentKind) -> String {
        match timeout(self.timeout, self.prompts.active_template(kind)).await {
            Ok(Ok(Some(template))) if !template.trim().is_empty() => template,
            Ok(Ok(_)) => default_template(kind).to_string(),
            Ok(Err(err)) => {
                warn!(
                    target: "synthesizer",
                    document = kind.as_str(),
                    error = %err,
                    "prompt template lookup failed; using built-in default"
                );
                default_template(kind).to_string()
            }
            Err(_) => {
                warn!(
                    target: "synthesizer",
                    document = kind.as_str(),
                    "prompt template lookup timed out; using built-in default"
                );
                default_template(kind).to_string()
            }
        }
    }

    async fn is_live(&self, slot: &SessionSlot) -> bool {
        self.registry.is_current(slot.meeting_id(), slot.epoch()).await
    }

    async fn apply(&self, job: SynthesisJob, content: String, started: Instant) {
        let slot = Arc::clone(&job.slot);
        let kind = job.kind;

        if !self.is_live(&slot).await {
            slot.lock().await.track_mut(kind).release();
            self.discard(&job);
            return;
        }

        let (version, observation_count, record) = {
            let mut session = slot.lock().await;
            if !session.active {
                session.track_mut(kind).release();
                drop(session);
                self.discard(&job);
                return;
            }
            let observation_count = session.observations().len();
            let track = session.track_mut(kind);
            track.commit(
                content.clone(),
                job.consumed_to,
                observation_count,
                job.triggered_at,
                unix_time_ms(),
            );
            (track.document.version, observation_count, session.record.clone())
        };

        record_synthesis(
            slot.meeting_id(),
            kind,
            version,
            job.observations.len(),
            started.elapsed(),
            None,
        );

        // The flag stays claimed through diagram rendering so a newer
        // procedure revision cannot overtake this one on the update channel.
        let diagram = match kind {
            DocumentKind::Procedure => self.render_diagram(slot.meeting_id(), &content).await,
            DocumentKind::RoleOutcomes => None,
        };

        slot.lock().await.track_mut(kind).release();

        if !self.is_live(&slot).await {
            debug!(
                target: "synthesizer",
                meeting_id = slot.meeting_id(),
                document = kind.as_str(),
                "session ended during diagram rendering; update not delivered"
            );
            return;
        }

        let result = document_result(
            kind,
            content,
            version,
            observation_count,
            diagram,
            record,
            None,
        );
        self.emit(slot.meeting_id(), result).await;
    }

    async fn render_diagram(&self, meeting_id: &str, content: &str) -> Option<String> {
        match self.diagrams.generate(content).await {
            Ok(diagram) => Some(diagram.into_inner()),
            Err(err) => {
                warn!(
                    target: "synthesizer",
                    meeting_id,
                    %err,
                    "diagram generation failed; delivering document without it"
                );
                None
            }
        }
    }

    async fn fail(&self, job: SynthesisJob, error: String, started: Instant) {
        let slot = Arc::clone(&job.slot);
        let (content, version, observation_count, record) = {
            let mut session = slot.lock().await;
            let observation_count = session.observations().len();
            let record = session.record.clone();
            let track = session.track_mut(job.kind);
            track.release();
            (
                track.document.content.clone(),
                track.document.version,
                observation_count,
                record,
            )
        };

        record_synthesis(
            slot.meeting_id(),
            job.kind,
            version,
            job.observations.len(),
            started.elapsed(),
            Some(error),
        );

        if !self.is_live(&slot).await {
            return;
        }

        let result = document_result(
            job.kind,
            content,
            version,
            observation_count,
            None,
            record,
            Some(SynthesisPhase::Failed),
        );
        self.emit(slot.meeting_id(), result).await;
    }

    fn discard(&self, job: &SynthesisJob) {
        info!(
            target: "synthesizer",
            meeting_id = job.slot.meeting_id(),
            epoch = job.slot.epoch(),
            document = job.kind.as_str(),
            "session stopped or replaced; discarding synthesis result"
        );
    }

    async fn emit(&self, meeting_id: &str, result: OutboundResult) {
        if self
            .updates
            .send(EngineUpdate::new(meeting_id, result))
            .await
            .is_err()
        {
            debug!(
                target: "synthesizer",
                meeting_id,
                "update receiver dropped; synthesis result not delivered"
            );
        }
    }
}

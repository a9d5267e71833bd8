use std::time::{Duration, Instant};

use crate::orchestrator::config::EngineConfig;
use crate::orchestrator::types::{
    Document, DocumentKind, DocumentSnapshot, Observation, RecordRef, SessionSnapshot,
};

use super::fusion::TranscriptBuffer;
use super::gate::FrameGateState;

#[derive(Debug)]
pub(crate) struct DocumentTrack {
    pub(crate) document: Document,
    cursor: usize,
    last_synthesis_at: Instant,
    in_flight: bool,
}

impl DocumentTrack {
    fn new(kind: DocumentKind, now: Instant) -> Self {
        Self {
            document: Document::empty(kind),
            cursor: 0,
            last_synthesis_at: now,
            in_flight: false,
        }
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn pending(&self, observation_count: usize) -> usize {
        observation_count.saturating_sub(self.cursor)
    }

    pub(crate) fn since_last_synthesis(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_synthesis_at)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn try_claim(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub(crate) fn release(&mut self) {
        self.in_flight = false;
    }

    /// Applies a successful synthesis: new content, cursor moved forward to
    /// `consumed` (never backward, never past `observation_count`), version +1.
    pub(crate) fn commit(
        &mut self,
        content: String,
        consumed: usize,
        observation_count: usize,
        now: Instant,
        wall_ms: u64,
    ) {
        self.document.content = content;
        self.document.version += 1;
        self.document.updated_at_ms = Some(wall_ms);
        self.cursor = self.cursor.max(consumed.min(observation_count));
        self.last_synthesis_at = now;
    }

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            kind: self.document.kind,
            content: self.document.content.clone(),
            version: self.document.version,
            cursor: self.cursor,
            in_flight: self.is_in_flight(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) meeting_id: String,
    pub(crate) epoch: u64,
    pub(crate) active: bool,
    pub(crate) created_at: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) record: RecordRef,
    pub(crate) gate: FrameGateState,
    pub(crate) last_response: Option<String>,
    pub(crate) extraction_in_flight: bool,
    pub(crate) transcript: TranscriptBuffer,
    observations: Vec<Observation>,
    procedure: DocumentTrack,
    role_outcomes: DocumentTrack,
}

impl Session {
    pub(crate) fn new(
        meeting_id: impl Into<String>,
        epoch: u64,
        record: RecordRef,
        now: Instant,
        config: &EngineConfig,
    ) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            epoch,
            active: true,
            created_at: now,
            last_activity: now,
            record,
            gate: FrameGateState::new(now),
            last_response: None,
            extraction_in_flight: false,
            transcript: TranscriptBuffer::new(config.transcript_capacity),
            observations: Vec::new(),
            procedure: DocumentTrack::new(DocumentKind::Procedure, now),
            role_outcomes: DocumentTrack::new(DocumentKind::RoleOutcomes, now),
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub(crate) fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > idle_timeout
    }

    pub(crate) fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub(crate) fn push_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub(crate) fn track(&self, kind: DocumentKind) -> &DocumentTrack {
        match kind {
            DocumentKind::Procedure => &self.procedure,
            DocumentKind::RoleOutcomes => &self.role_outcomes,
        }
    }

    pub(crate) fn track_mut(&mut self, kind: DocumentKind) -> &mut DocumentTrack {
        match kind {
            DocumentKind::Procedure => &mut self.procedure,
            DocumentKind::RoleOutcomes => &mut self.role_outcomes,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            meeting_id: self.meeting_id.clone(),
            epoch: self.epoch,
            observation_count: self.observations.len(),
            transcript_entries: self.transcript.len(),
            frames_since_analysis: self.gate.frames_since_analysis(),
            record: self.record.clone(),
            procedure: self.procedure.snapshot(),
            role_outcomes: self.role_outcomes.snapshot(),
        }
    }
}

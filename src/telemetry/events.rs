use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::orchestrator::types::DocumentKind;

pub(crate) const TARGET: &str = "telemetry::live_doc";
pub(crate) const EVENT_FRAME: &str = "frame_gate";
pub(crate) const EVENT_EXTRACTION: &str = "frame_extraction";
pub(crate) const EVENT_SYNTHESIS: &str = "document_synthesis";

#[derive(Debug, Serialize)]
pub struct FrameDecisionEvent<'a> {
    pub meeting_id: &'a str,
    pub decision: &'static str,
    pub changed: bool,
    pub frames_since_analysis: u32,
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ExtractionEvent<'a> {
    pub meeting_id: &'a str,
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub observation_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SynthesisEvent<'a> {
    pub meeting_id: &'a str,
    pub document: &'static str,
    pub version: u64,
    pub consumed: usize,
    pub latency_ms: u64,
    pub succeeded: bool,
    pub error: Option<String>,
}

pub fn record_frame_decision(
    meeting_id: &str,
    decision: &'static str,
    changed: bool,
    frames_since_analysis: u32,
    wait: Option<Duration>,
) {
    let event = FrameDecisionEvent {
        meeting_id,
        decision,
        changed,
        frames_since_analysis,
        wait_ms: wait.map(duration_to_ms),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_FRAME,
            meeting_id,
            decision,
            changed,
            frames_since_analysis,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_FRAME,
            %err,
            "failed to encode frame gate event"
        ),
    }
}

pub fn record_extraction(
    meeting_id: &str,
    outcome: &'static str,
    latency: Duration,
    observation_count: usize,
) {
    let event = ExtractionEvent {
        meeting_id,
        outcome,
        latency_ms: duration_to_ms(latency),
        observation_count,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_EXTRACTION,
            meeting_id,
            outcome,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_EXTRACTION,
            %err,
            "failed to encode extraction event"
        ),
    }
}

pub fn record_synthesis(
    meeting_id: &str,
    kind: DocumentKind,
    version: u64,
    consumed: usize,
    latency: Duration,
    error: Option<String>,
) {
    let event = SynthesisEvent {
        meeting_id,
        document: kind.as_str(),
        version,
        consumed,
        latency_ms: duration_to_ms(latency),
        succeeded: error.is_none(),
        error,
    };

    match serde_json::to_string(&event) {
        Ok(payload) if event.succeeded => info!(
            target: TARGET,
            event = EVENT_SYNTHESIS,
            meeting_id,
            document = event.document,
            version,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Ok(payload) => warn!(
            target: TARGET,
            event = EVENT_SYNTHESIS,
            meeting_id,
            document = event.document,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SYNTHESIS,
            %err,
            "failed to encode synthesis event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

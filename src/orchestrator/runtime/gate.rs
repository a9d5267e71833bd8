//! Frame change detection and adaptive rate limiting.

use std::time::{Duration, Instant};

use crate::orchestrator::config::EngineConfig;
use crate::orchestrator::traits::Fingerprinter;
use crate::orchestrator::types::Fingerprint;

/// Strided forward and backward folds, paired with the payload length.
#[derive(Debug, Clone)]
pub struct SampledFoldFingerprinter {
    stride: usize,
}

impl SampledFoldFingerprinter {
    pub fn new(stride: usize) -> Self {
        Self {
            stride: stride.max(1),
        }
    }
}

impl Fingerprinter for SampledFoldFingerprinter {
    fn fingerprint(&self, payload: &[u8]) -> Fingerprint {
        let front = payload.iter().step_by(self.stride).fold(0_u32, fold_byte);
        let back = payload
            .iter()
            .rev()
            .skip(self.stride / 2)
            .step_by(self.stride)
            .fold(0_u32, fold_byte);

        Fingerprint {
            front,
            back,
            len: payload.len() as u64,
        }
    }
}

fn fold_byte(hash: u32, byte: &u8) -> u32 {
    hash.wrapping_shl(5)
        .wrapping_sub(hash)
        .wrapping_add(u32::from(*byte))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateDecision {
    Accept { changed: bool, forced: bool },
    Skip { changed: bool, wait: Duration },
}

impl GateDecision {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            GateDecision::Accept { forced: true, .. } => "accept_forced",
            GateDecision::Accept { .. } => "accept",
            GateDecision::Skip { .. } => "skip",
        }
    }

    pub(crate) fn changed(&self) -> bool {
        match self {
            GateDecision::Accept { changed, .. } | GateDecision::Skip { changed, .. } => *changed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FrameGateState {
    last_fingerprint: Option<Fingerprint>,
    frames_since_analysis: u32,
    last_analysis_at: Option<Instant>,
    last_forced_check_at: Instant,
}

impl FrameGateState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_fingerprint: None,
            frames_since_analysis: 0,
            last_analysis_at: None,
            last_forced_check_at: now,
        }
    }

    pub(crate) fn frames_since_analysis(&self) -> u32 {
        self.frames_since_analysis
    }

    pub(crate) fn evaluate(
        &self,
        fingerprint: Fingerprint,
        now: Instant,
        config: &EngineConfig,
    ) -> GateDecision {
        let changed = self.last_fingerprint != Some(fingerprint);

        let Some(last_analysis) = self.last_analysis_at else {
            return GateDecision::Accept {
                changed,
                forced: false,
            };
        };

        let forced = self.frames_since_analysis >= config.force_after_frames
            || now.saturating_duration_since(self.last_forced_check_at)
                >= config.force_recheck_interval;

        let interval = if changed || forced {
            config.changed_interval
        } else {
            config.unchanged_interval
        };

        let elapsed = now.saturating_duration_since(last_analysis);
        if elapsed >= interval {
            GateDecision::Accept { changed, forced }
        } else {
            GateDecision::Skip {
                changed,
                wait: interval - elapsed,
            }
        }
    }

    pub(crate) fn commit_accept(&mut self, fingerprint: Fingerprint, now: Instant) {
        self.last_fingerprint = Some(fingerprint);
        self.frames_since_analysis = 0;
        self.last_analysis_at = Some(now);
        self.last_forced_check_at = now;
    }

    pub(crate) fn record_skip(&mut self) {
        self.frames_since_analysis = self.frames_since_analysis.saturating_add(1);
    }
}

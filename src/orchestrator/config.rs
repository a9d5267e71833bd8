use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::orchestrator::constants::DEFAULT_FINGERPRINT_STRIDE;

/// Tunables for the live engine.
///
/// The defaults are product-tuned values; every field can be overridden
/// through `LIVEDOC_*` environment variables via [`EngineConfig::from_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between analyses when the frame fingerprint changed.
    pub changed_interval: Duration,
    /// Minimum spacing between analyses when the frame looks unchanged.
    pub unchanged_interval: Duration,
    /// Frames counted since the last analysis that force a recheck.
    pub force_after_frames: u32,
    /// Elapsed time since the last forced check that forces a recheck.
    pub force_recheck_interval: Duration,
    /// Word-overlap ratio above which an extraction is a duplicate.
    pub similarity_threshold: f32,
    pub transcript_capacity: usize,
    pub idle_timeout: Duration,
    /// Period of the background sweep that reaps idle sessions.
    pub reaper_period: Duration,
    pub procedure_min_observations: usize,
    pub procedure_min_interval: Duration,
    pub procedure_min_transcript_entries: usize,
    pub role_outcomes_min_observations: usize,
    /// Transcript length (in characters) that is enough to synthesize on its own.
    pub transcript_min_chars: usize,
    pub inference_timeout: Duration,
    pub update_buffer: usize,
    pub fingerprint_stride: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            changed_interval: Duration::from_secs(5),
            unchanged_interval: Duration::from_secs(30),
            force_after_frames: 6,
            force_recheck_interval: Duration::from_secs(60),
            similarity_threshold: 0.70,
            transcript_capacity: 50,
            idle_timeout: Duration::from_secs(10 * 60),
            reaper_period: Duration::from_secs(60),
            procedure_min_observations: 2,
            procedure_min_interval: Duration::from_secs(30),
            procedure_min_transcript_entries: 3,
            role_outcomes_min_observations: 1,
            transcript_min_chars: 50,
            inference_timeout: Duration::from_secs(45),
            update_buffer: 64,
            fingerprint_stride: DEFAULT_FINGERPRINT_STRIDE,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_secs("LIVEDOC_CHANGED_INTERVAL_SECS") {
            config.changed_interval = value;
        }
        if let Some(value) = env_secs("LIVEDOC_UNCHANGED_INTERVAL_SECS") {
            config.unchanged_interval = value;
        }
        if let Some(value) = env_parse("LIVEDOC_FORCE_AFTER_FRAMES") {
            config.force_after_frames = value;
        }
        if let Some(value) = env_secs("LIVEDOC_FORCE_RECHECK_SECS") {
            config.force_recheck_interval = value;
        }
        if let Some(value) = env_parse::<f32>("LIVEDOC_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = value.clamp(0.0, 1.0);
        }
        if let Some(value) = env_parse::<usize>("LIVEDOC_TRANSCRIPT_CAPACITY") {
            config.transcript_capacity = value.max(1);
        }
        if let Some(value) = env_secs("LIVEDOC_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = value;
        }
        if let Some(value) = env_secs("LIVEDOC_REAPER_PERIOD_SECS") {
            config.reaper_period = value.max(Duration::from_secs(1));
        }
        if let Some(value) = env_parse("LIVEDOC_PROCEDURE_MIN_OBSERVATIONS") {
            config.procedure_min_observations = value;
        }
        if let Some(value) = env_secs("LIVEDOC_PROCEDURE_MIN_INTERVAL_SECS") {
            config.procedure_min_interval = value;
        }
        if let Some(value) = env_parse("LIVEDOC_PROCEDURE_MIN_TRANSCRIPT_ENTRIES") {
            config.procedure_min_transcript_entries = value;
        }
        if let Some(value) = env_parse("LIVEDOC_ROLE_OUTCOMES_MIN_OBSERVATIONS") {
            config.role_outcomes_min_observations = value;
        }
        if let Some(value) = env_parse("LIVEDOC_TRANSCRIPT_MIN_CHARS") {
            config.transcript_min_chars = value;
        }
        if let Some(value) = env_secs("LIVEDOC_INFERENCE_TIMEOUT_SECS") {
            config.inference_timeout = value;
        }
        if let Some(value) = env_parse::<usize>("LIVEDOC_UPDATE_BUFFER") {
            config.update_buffer = value.max(1);
        }
        if let Some(value) = env_parse::<usize>("LIVEDOC_FINGERPRINT_STRIDE") {
            config.fingerprint_stride = value.max(1);
        }

        config
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                target: "engine_config",
                key,
                value = %raw,
                "ignoring unparsable configuration override"
            );
            None
        }
    }
}

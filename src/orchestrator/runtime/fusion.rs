//! Bounded transcript buffer and transcript-to-observation promotion.

use std::collections::VecDeque;

use crate::orchestrator::constants::{PROCEDURAL_KEYWORDS, PROCEDURAL_PHRASES};
use crate::orchestrator::runtime::extractor::{classify, tokens};
use crate::orchestrator::types::{Observation, ObservationSource, TranscriptEntry};

#[derive(Debug)]
pub(crate) struct TranscriptBuffer {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl TranscriptBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, entry: TranscriptEntry) -> Option<TranscriptEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_chars(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.text.chars().count())
            .sum()
    }

    pub(crate) fn to_vec(&self) -> Vec<TranscriptEntry> {
        self.entries.iter().cloned().collect()
    }
}

pub(crate) fn is_procedural(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if PROCEDURAL_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        return true;
    }

    let found = tokens(&lowered).any(|token| PROCEDURAL_KEYWORDS.contains(&token.as_str()));
    found
}

pub(crate) fn promote(entry: &TranscriptEntry) -> Option<Observation> {
    if !is_procedural(&entry.text) {
        return None;
    }

    Some(Observation {
        timestamp_ms: entry.timestamp_ms,
        description: format!("{}: {}", entry.speaker, entry.text.trim()),
        kind: classify(&entry.text),
        source: ObservationSource::Transcript,
    })
}

//! Turns extraction responses into validated observations.

use std::collections::HashSet;

use thiserror::Error;

use crate::orchestrator::constants::{
    ACTION_MARKER, ACTION_VERBS, MIN_ACTION_CHARS, NO_ACTION_SENTINEL,
    SIMILARITY_IGNORED_TOKEN_CHARS,
};
use crate::orchestrator::types::{Observation, ObservationKind, ObservationSource};

/// Why an extraction response was not promoted to an observation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("response has no ACTION: marker")]
    MissingActionMarker,
    #[error("action text is shorter than {min} characters")]
    ActionTooShort { min: usize },
    #[error("response names no recognised action verb")]
    NoActionVerb,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExtractionOutcome {
    NothingVisible,
    Duplicate { similarity: f32 },
    Rejected(Rejection),
    Recorded(Observation),
}

pub(crate) fn interpret(
    response: &str,
    previous: Option<&str>,
    similarity_threshold: f32,
    timestamp_ms: u64,
) -> ExtractionOutcome {
    let text = response.trim();
    if text.is_empty() || is_sentinel(text) {
        return ExtractionOutcome::NothingVisible;
    }

    if let Some(previous) = previous {
        let similarity = similarity(previous, text);
        if similarity > similarity_threshold {
            return ExtractionOutcome::Duplicate { similarity };
        }
    }

    match validate(text) {
        Ok(()) => ExtractionOutcome::Recorded(Observation {
            timestamp_ms,
            description: text.to_string(),
            kind: classify(text),
            source: ObservationSource::Screen,
        }),
        Err(rejection) => ExtractionOutcome::Rejected(rejection),
    }
}

fn is_sentinel(text: &str) -> bool {
    text.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .eq_ignore_ascii_case(NO_ACTION_SENTINEL)
}

pub(crate) fn validate(text: &str) -> Result<(), Rejection> {
    let action = text
        .lines()
        .find_map(|line| strip_marker(line.trim()))
        .ok_or(Rejection::MissingActionMarker)?;

    if action.trim().chars().count() < MIN_ACTION_CHARS {
        return Err(Rejection::ActionTooShort {
            min: MIN_ACTION_CHARS,
        });
    }

    let has_verb =
        tokens(text).any(|token| ACTION_VERBS.iter().any(|verb| is_verb_form(&token, verb)));
    if !has_verb {
        return Err(Rejection::NoActionVerb);
    }

    Ok(())
}

fn strip_marker(line: &str) -> Option<&str> {
    let line = line.trim_start_matches(['*', '-', ' ']);
    let head = line.get(..ACTION_MARKER.len())?;
    if head.eq_ignore_ascii_case(ACTION_MARKER) {
        Some(line[ACTION_MARKER.len()..].trim_start_matches('*'))
    } else {
        None
    }
}

fn is_verb_form(token: &str, verb: &str) -> bool {
    let Some(rest) = token.strip_prefix(verb) else {
        return verb
            .strip_suffix('e')
            .is_some_and(|stem| token.strip_prefix(stem) == Some("ing"));
    };
    matches!(
        rest,
        "" | "s" | "es" | "d" | "ed" | "ing" | "ned" | "ning" | "ped" | "ping" | "ted" | "ting"
            | "ged" | "ging"
    )
}

pub(crate) fn classify(text: &str) -> ObservationKind {
    const RULES: &[(ObservationKind, &[&str])] = &[
        (
            ObservationKind::Code,
            &[
                "code", "function", "terminal", "ide", "editor", "script", "compile", "git",
                "repository", "commit",
            ],
        ),
        (
            ObservationKind::Diagram,
            &["diagram", "flowchart", "chart", "graph", "whiteboard", "mermaid"],
        ),
        (
            ObservationKind::Presentation,
            &["slide", "slides", "presentation", "powerpoint", "keynote", "deck"],
        ),
        (
            ObservationKind::Document,
            &[
                "document", "doc", "docs", "spreadsheet", "pdf", "word", "excel", "sheet",
                "report", "wiki",
            ],
        ),
        (
            ObservationKind::Ui,
            &[
                "button", "menu", "form", "dialog", "field", "dropdown", "tab", "page",
                "settings", "click", "window", "checkbox", "modal",
            ],
        ),
    ];

    let words: HashSet<String> = tokens(text).collect();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| words.contains(*keyword)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ObservationKind::Other)
}

/// Overlap of the significant word sets: `|A ∩ B| / max(|A|, |B|)`.
pub(crate) fn similarity(lhs: &str, rhs: &str) -> f32 {
    let left = significant_words(lhs);
    let right = significant_words(rhs);
    let largest = left.len().max(right.len());
    if largest == 0 {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    shared as f32 / largest as f32
}

fn significant_words(text: &str) -> HashSet<String> {
    tokens(text)
        .filter(|token| token.chars().count() > SIMILARITY_IGNORED_TOKEN_CHARS)
        .collect()
}

pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

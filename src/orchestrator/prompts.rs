//! Built-in prompt templates and the prompt store adapters.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::orchestrator::constants::NO_ACTION_SENTINEL;
use crate::orchestrator::traits::PromptStore;
use crate::orchestrator::types::{DocumentKind, Observation, TranscriptEntry};

const DEFAULT_PROCEDURE_TEMPLATE: &str = "You maintain a living standard operating procedure (SOP) \
for the workflow being demonstrated in a meeting. Write it in Markdown with a short purpose \
statement, prerequisites, and numbered steps. Each step names the system, the exact action, and \
any values entered. Keep steps in the order they were performed.";

const DEFAULT_ROLE_OUTCOMES_TEMPLATE: &str = "You maintain a living customer role-outcomes \
document for this meeting. Write it in Markdown: for every role or stakeholder mentioned, list \
their responsibilities, the outcomes they expect, and any open decisions. Use only facts stated \
in the meeting.";

pub(crate) const CHAT_PERSONA: &str = "You are a concise meeting assistant. You help participants \
capture procedures, decisions, and follow-ups. Answer in plain language and keep replies short.";

pub(crate) const TRANSCRIPTION_PROMPT: &str =
    "Transcribe the spoken words in this audio verbatim. Return only the transcript text.";

pub fn default_template(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Procedure => DEFAULT_PROCEDURE_TEMPLATE,
        DocumentKind::RoleOutcomes => DEFAULT_ROLE_OUTCOMES_TEMPLATE,
    }
}

pub(crate) fn extraction_prompt(previous: Option<&str>) -> String {
    let mut prompt = format!(
        "You are watching a screen share from a live meeting. If the frame shows someone \
performing a step of a procedure, answer in exactly this form:\n\
ACTION: <what the user did, starting with a verb>\n\
SYSTEM: <application or system in use>\n\
DETAILS: <fields, values, or options involved>\n\
If no procedural activity is visible, answer with {NO_ACTION_SENTINEL} and nothing else."
    );

    if let Some(previous) = previous {
        let _ = write!(
            prompt,
            "\n\nYour previous answer was:\n{previous}\nDo not repeat it. Only report a new action."
        );
    }
    prompt
}

pub(crate) fn synthesis_prompt(
    template: &str,
    kind: DocumentKind,
    existing: &str,
    version: u64,
    observations: &[Observation],
    transcript: &[TranscriptEntry],
) -> String {
    let mut prompt = String::with_capacity(template.len() + 1_024);
    prompt.push_str(template.trim());

    let _ = write!(prompt, "\n\n## Current {} document (version {version})\n", kind.as_str());
    if existing.trim().is_empty() {
        prompt.push_str("(empty, this is the first draft)\n");
    } else {
        prompt.push_str(existing.trim());
        prompt.push('\n');
    }

    prompt.push_str("\n## New observations\n");
    if observations.is_empty() {
        prompt.push_str("(none since the last revision)\n");
    }
    for (index, observation) in observations.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{} via {}] {}",
            index + 1,
            observation.kind.as_str(),
            observation.source.as_str(),
            observation.description.replace('\n', " | ")
        );
    }

    prompt.push_str("\n## Recent transcript\n");
    if transcript.is_empty() {
        prompt.push_str("(no speech captured)\n");
    }
    for entry in transcript {
        let _ = writeln!(prompt, "{}: {}", entry.speaker, entry.text.trim());
    }

    prompt.push_str(
        "\nMerge the new material into the current document instead of replacing it. Keep \
content that is still correct, refine it where the new material adds detail, and return the \
complete updated document only.",
    );
    prompt
}

pub(crate) fn diagram_prompt(document: &str) -> String {
    format!(
        "Convert the following procedure into a Mermaid flowchart. Return only the Mermaid code, \
starting with `flowchart TD`.\n\n{}",
        document.trim()
    )
}

/// In-memory templates, mostly useful for embedding and tests. An empty store
/// makes every synthesis use the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptStore {
    templates: HashMap<DocumentKind, String>,
}

impl StaticPromptStore {
    pub fn with_template(mut self, kind: DocumentKind, template: impl Into<String>) -> Self {
        self.templates.insert(kind, template.into());
        self
    }
}

#[async_trait]
impl PromptStore for StaticPromptStore {
    async fn active_template(&self, kind: DocumentKind) -> Result<Option<String>> {
        Ok(self.templates.get(&kind).cloned())
    }
}

/// Reads `<root>/<category>.md`, e.g. `sop_generation.md`. Missing or blank
/// files mean "no active template".
#[derive(Debug, Clone)]
pub struct DirectoryPromptStore {
    root: PathBuf,
}

impl DirectoryPromptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PromptStore for DirectoryPromptStore {
    async fn active_template(&self, kind: DocumentKind) -> Result<Option<String>> {
        let path = self.root.join(format!("{}.md", kind.template_category()));
        match tokio::fs::read_to_string(&path).await {
            Ok(template) if template.trim().is_empty() => Ok(None),
            Ok(template) => Ok(Some(template)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read prompt template {}", path.display())),
        }
    }
}

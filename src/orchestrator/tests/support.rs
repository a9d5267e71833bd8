use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use crate::orchestrator::*;

pub(crate) const PROCEDURE_REPLY: &str = "# Procedure\n1. Open the portal\n2. Configure billing";
pub(crate) const ROLE_OUTCOMES_REPLY: &str = "## Roles\n- Admin owns billing setup";
pub(crate) const DIAGRAM_REPLY: &str = "flowchart TD\n  A[Open portal] --> B[Configure billing]";

pub(crate) const SAVE_ACTION: &str =
    "ACTION: click Save on the profile form\nSYSTEM: CRM\nDETAILS: display name field";
pub(crate) const INVOICE_ACTION: &str =
    "ACTION: navigate to the billing tab and download invoice\nSYSTEM: Billing portal";

/// Scripted inference backend. Replies are queued per task; a task without
/// queued replies gets a canned default. One task kind can be held until the
/// test releases it.
pub(crate) struct MockInference {
    replies: Mutex<HashMap<InferenceTask, VecDeque<Result<String, InferenceError>>>>,
    calls: Mutex<Vec<InferenceRequest>>,
    held: Mutex<Option<InferenceTask>>,
    entered: Notify,
    release: Notify,
}

impl MockInference {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(None),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub(crate) fn queue(&self, task: InferenceTask, reply: Result<&str, InferenceError>) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .entry(task)
            .or_default()
            .push_back(reply.map(str::to_string));
    }

    pub(crate) fn hold(&self, task: InferenceTask) {
        *self.held.lock().expect("held lock poisoned") = Some(task);
    }

    pub(crate) async fn wait_until_held(&self) {
        timeout(Duration::from_secs(2), self.entered.notified())
            .await
            .expect("held inference call should start");
    }

    pub(crate) fn release(&self) {
        *self.held.lock().expect("held lock poisoned") = None;
        self.release.notify_one();
    }

    pub(crate) fn calls_for(&self, task: InferenceTask) -> Vec<InferenceRequest> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .iter()
            .filter(|request| request.task == task)
            .cloned()
            .collect()
    }

    fn default_reply(task: InferenceTask) -> String {
        match task {
            InferenceTask::Extraction => "NO_ACTION".into(),
            InferenceTask::Synthesis(DocumentKind::Procedure) => PROCEDURE_REPLY.into(),
            InferenceTask::Synthesis(DocumentKind::RoleOutcomes) => ROLE_OUTCOMES_REPLY.into(),
            InferenceTask::Diagram => DIAGRAM_REPLY.into(),
            InferenceTask::Transcription => "first open the admin portal".into(),
            InferenceTask::Chat => "Happy to help.".into(),
        }
    }
}

#[async_trait]
impl InferenceService for MockInference {
    async fn generate(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let task = request.task;
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(request);

        let held = *self.held.lock().expect("held lock poisoned") == Some(task);
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }

        self.replies
            .lock()
            .expect("replies lock poisoned")
            .get_mut(&task)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Self::default_reply(task)))
    }
}

/// Defaults with a stride of one so every byte feeds the fingerprint.
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        fingerprint_stride: 1,
        inference_timeout: Duration::from_secs(2),
        ..EngineConfig::default()
    }
}

pub(crate) fn engine(mock: &Arc<MockInference>) -> (LiveEngine, mpsc::Receiver<EngineUpdate>) {
    engine_with(mock, test_config(), Arc::new(StaticPromptStore::default()))
}

pub(crate) fn engine_with(
    mock: &Arc<MockInference>,
    config: EngineConfig,
    prompts: Arc<dyn PromptStore>,
) -> (LiveEngine, mpsc::Receiver<EngineUpdate>) {
    let inference: Arc<dyn InferenceService> = Arc::clone(mock) as Arc<dyn InferenceService>;
    LiveEngine::new(config, Some(inference), prompts)
}

pub(crate) fn start(meeting_id: &str) -> InboundMessage {
    control(meeting_id, ControlAction::Start)
}

pub(crate) fn control(meeting_id: &str, action: ControlAction) -> InboundMessage {
    InboundMessage::Control {
        meeting_id: meeting_id.into(),
        action,
        record: RecordRef::Ephemeral,
    }
}

pub(crate) fn frame(meeting_id: &str, payload: &[u8]) -> InboundMessage {
    InboundMessage::Video {
        meeting_id: meeting_id.into(),
        data: BASE64.encode(payload),
        mime_type: "image/jpeg".into(),
    }
}

pub(crate) fn transcript(meeting_id: &str, text: &str) -> InboundMessage {
    InboundMessage::Transcript {
        meeting_id: meeting_id.into(),
        text: text.into(),
        speaker: "alex".into(),
        is_final: true,
        generate_procedure: true,
        generate_role_outcomes: true,
    }
}

pub(crate) fn results(updates: &[EngineUpdate]) -> Vec<&OutboundResult> {
    updates.iter().map(|update| &update.result).collect()
}

pub(crate) fn has_status(updates: &[EngineUpdate], status: SessionStatus) -> bool {
    updates
        .iter()
        .any(|update| update.result == OutboundResult::status(status))
}

pub(crate) fn has_sop_generating(updates: &[EngineUpdate]) -> bool {
    updates.iter().any(|update| {
        matches!(
            &update.result,
            OutboundResult::SopStatus(ProcedureSnapshot {
                phase: Some(SynthesisPhase::Generating),
                ..
            })
        )
    })
}

pub(crate) fn has_cro_generating(updates: &[EngineUpdate]) -> bool {
    updates.iter().any(|update| {
        matches!(
            &update.result,
            OutboundResult::CroStatus(RoleOutcomesSnapshot {
                phase: Some(SynthesisPhase::Generating),
                ..
            })
        )
    })
}

pub(crate) async fn next_update(rx: &mut mpsc::Receiver<EngineUpdate>) -> EngineUpdate {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("update should arrive before the deadline")
        .expect("update channel open")
}

pub(crate) async fn wait_for<F>(rx: &mut mpsc::Receiver<EngineUpdate>, mut predicate: F) -> EngineUpdate
where
    F: FnMut(&OutboundResult) -> bool,
{
    loop {
        let update = next_update(rx).await;
        if predicate(&update.result) {
            return update;
        }
    }
}

pub(crate) async fn sop_update(rx: &mut mpsc::Receiver<EngineUpdate>) -> ProcedureSnapshot {
    match wait_for(rx, |result| matches!(result, OutboundResult::SopUpdate(_))).await.result {
        OutboundResult::SopUpdate(snapshot) => snapshot,
        other => panic!("unexpected update: {other:?}"),
    }
}

pub(crate) async fn cro_update(rx: &mut mpsc::Receiver<EngineUpdate>) -> RoleOutcomesSnapshot {
    match wait_for(rx, |result| matches!(result, OutboundResult::CroUpdate(_))).await.result {
        OutboundResult::CroUpdate(snapshot) => snapshot,
        other => panic!("unexpected update: {other:?}"),
    }
}

/// Asserts that no update matching `predicate` arrives within `window`.
pub(crate) async fn assert_quiet<F>(
    rx: &mut mpsc::Receiver<EngineUpdate>,
    window: Duration,
    mut predicate: F,
) where
    F: FnMut(&OutboundResult) -> bool,
{
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, rx.recv()).await {
            Ok(Some(update)) => assert!(
                !predicate(&update.result),
                "unexpected update: {update:?}"
            ),
            Ok(None) | Err(_) => return,
        }
    }
}

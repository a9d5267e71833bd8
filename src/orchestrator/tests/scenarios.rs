use std::sync::Arc;
use std::time::{Duration, Instant};

use super::support::*;
use crate::orchestrator::*;

const ROLE_SYNTHESIS: InferenceTask = InferenceTask::Synthesis(DocumentKind::RoleOutcomes);
const PROCEDURE_SYNTHESIS: InferenceTask = InferenceTask::Synthesis(DocumentKind::Procedure);

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

#[tokio::test]
async fn identical_frame_within_unchanged_interval_is_skipped() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    let first = engine.handle_at(frame("m", b"same-pixels"), t0).await;
    assert!(has_status(&first, SessionStatus::Observing));

    let second = engine.handle_at(frame("m", b"same-pixels"), t0 + secs(10)).await;
    assert!(has_status(&second, SessionStatus::Skipped));
    assert_eq!(mock.calls_for(InferenceTask::Extraction).len(), 1);

    let snapshot = engine.lookup("m", t0 + secs(10)).await.expect("session alive");
    assert_eq!(snapshot.frames_since_analysis, 1);
}

#[tokio::test]
async fn changed_frame_waits_for_changed_interval() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(frame("m", b"frame-a"), t0).await;
    let early = engine.handle_at(frame("m", b"frame-b"), t0 + secs(3)).await;
    assert!(has_status(&early, SessionStatus::Skipped));

    let later = engine.handle_at(frame("m", b"frame-c"), t0 + secs(5)).await;
    assert!(has_status(&later, SessionStatus::Observing));
    assert_eq!(mock.calls_for(InferenceTask::Extraction).len(), 2);
}

#[tokio::test]
async fn seventh_unchanged_frame_forces_recheck() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(frame("m", b"static-slide"), t0).await;
    for second in 1..=6 {
        let updates = engine
            .handle_at(frame("m", b"static-slide"), t0 + secs(second))
            .await;
        assert!(has_status(&updates, SessionStatus::Skipped), "frame {second} skipped");
    }

    let forced = engine.handle_at(frame("m", b"static-slide"), t0 + secs(7)).await;
    assert!(has_status(&forced, SessionStatus::Observing));
    assert_eq!(mock.calls_for(InferenceTask::Extraction).len(), 2);

    let snapshot = engine.lookup("m", t0 + secs(7)).await.expect("session alive");
    assert_eq!(snapshot.frames_since_analysis, 0);
}

#[tokio::test]
async fn near_duplicate_extractions_store_one_observation() {
    let mock = MockInference::new();
    mock.queue(
        InferenceTask::Extraction,
        Ok("ACTION: click the Save button on the profile settings page"),
    );
    mock.queue(
        InferenceTask::Extraction,
        Ok("ACTION: click Save button on the profile settings page again"),
    );
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    let first = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(has_status(&first, SessionStatus::ObservationRecorded));

    let second = engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    assert!(has_status(&second, SessionStatus::Observing));

    let observations = engine.observations("m").await.expect("session alive");
    assert_eq!(observations.len(), 1);

    let repeat_prompt = &mock.calls_for(InferenceTask::Extraction)[1].prompt;
    assert!(repeat_prompt.contains("click the Save button"));
}

#[tokio::test]
async fn rejected_extraction_becomes_previous_answer_without_observation() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok("SYSTEM: CRM dashboard is visible"));
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    let first = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(has_status(&first, SessionStatus::Observing));
    assert!(engine
        .observations("m")
        .await
        .expect("session alive")
        .is_empty());

    engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    let repeat_prompt = &mock.calls_for(InferenceTask::Extraction)[1].prompt;
    assert!(repeat_prompt.contains("CRM dashboard is visible"));
}

#[tokio::test]
async fn scenario_two_frames_past_time_floor_synthesize_procedure_once() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.queue(InferenceTask::Extraction, Ok(INVOICE_ACTION));
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    assert!(has_status(
        &engine.handle_at(start("m"), t0).await,
        SessionStatus::Started
    ));

    let first = engine.handle_at(frame("m", b"hash-one"), t0).await;
    assert!(has_status(&first, SessionStatus::ObservationRecorded));
    assert!(!has_sop_generating(&first));

    let second = engine.handle_at(frame("m", b"hash-two"), t0 + secs(32)).await;
    assert!(has_status(&second, SessionStatus::ObservationRecorded));
    assert!(has_sop_generating(&second));

    let procedure = sop_update(&mut updates).await;
    assert_eq!(procedure.version, 1);
    assert_eq!(procedure.content, PROCEDURE_REPLY);
    assert_eq!(procedure.observation_count, 2);
    assert_eq!(procedure.diagram.as_deref(), Some(DIAGRAM_REPLY));
    assert_eq!(mock.calls_for(PROCEDURE_SYNTHESIS).len(), 1);

    let snapshot = engine.lookup("m", t0 + secs(32)).await.expect("session alive");
    assert_eq!(snapshot.procedure.version, 1);
    assert_eq!(snapshot.procedure.cursor, 2);
    assert!(!snapshot.procedure.in_flight);
}

#[tokio::test]
async fn scenario_transcript_fragments_trigger_role_outcomes_before_procedure() {
    let mock = MockInference::new();
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    let fragments = [
        "First open the portal",
        "then configure billing",
        "configure the app",
    ];
    assert_eq!(fragments.iter().map(|text| text.chars().count()).sum::<usize>(), 60);

    let first = engine.handle_at(transcript("m", fragments[0]), t0).await;
    assert!(has_status(&first, SessionStatus::TranscriptBuffered));
    assert!(has_cro_generating(&first));
    assert!(!has_sop_generating(&first));

    let roles = cro_update(&mut updates).await;
    assert_eq!(roles.version, 1);

    let second = engine.handle_at(transcript("m", fragments[1]), t0 + secs(1)).await;
    assert!(!has_sop_generating(&second));

    let third = engine.handle_at(transcript("m", fragments[2]), t0 + secs(2)).await;
    assert!(has_sop_generating(&third));

    let procedure = sop_update(&mut updates).await;
    assert_eq!(procedure.version, 1);

    let prompt = &mock.calls_for(PROCEDURE_SYNTHESIS)[0].prompt;
    assert!(prompt.contains("alex: First open the portal"));
    assert!(prompt.contains("alex: configure the app"));
}

#[tokio::test]
async fn scenario_result_arriving_after_stop_is_discarded() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.hold(ROLE_SYNTHESIS);
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(start("m"), t0).await;
    let accepted = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(has_cro_generating(&accepted));
    mock.wait_until_held().await;

    let stopped = engine.handle_at(control("m", ControlAction::Stop), t0 + secs(1)).await;
    assert!(has_status(&stopped, SessionStatus::Stopped));
    mock.release();

    assert_quiet(&mut updates, Duration::from_millis(200), |result| {
        matches!(
            result,
            OutboundResult::CroUpdate(_) | OutboundResult::CroStatus(_)
        )
    })
    .await;
    assert!(engine.lookup("m", t0 + secs(1)).await.is_none());

    engine.handle_at(start("m"), t0 + secs(2)).await;
    let fresh = engine.lookup("m", t0 + secs(2)).await.expect("restarted");
    assert_eq!(fresh.role_outcomes.version, 0);
    assert_eq!(fresh.observation_count, 0);
}

#[tokio::test]
async fn extraction_finishing_after_stop_does_not_resurrect_session() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.hold(InferenceTask::Extraction);
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(start("m"), t0).await;
    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.handle_at(frame("m", b"frame-1"), t0).await })
    };
    mock.wait_until_held().await;

    engine.handle_at(control("m", ControlAction::Stop), t0).await;
    mock.release();

    let replies = pending.await.expect("frame task joined");
    assert!(replies.is_empty());
    assert!(engine.lookup("m", t0).await.is_none());
    assert_eq!(engine.active_sessions().await, 0);
}

#[tokio::test]
async fn scenario_idle_session_is_replaced_by_fresh_one() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(frame("m", b"frame-1"), t0).await;
    let roles = cro_update(&mut updates).await;
    assert_eq!(roles.version, 1);
    let original = engine.lookup("m", t0).await.expect("session alive");

    let later = t0 + secs(11 * 60);
    assert!(engine.lookup("m", later).await.is_none());

    let updates_after_idle = engine.handle_at(frame("m", b"frame-2"), later).await;
    assert!(has_status(&updates_after_idle, SessionStatus::Observing));

    let fresh = engine.lookup("m", later).await.expect("fresh session");
    assert_ne!(fresh.epoch, original.epoch);
    assert_eq!(fresh.observation_count, 0);
    assert_eq!(fresh.procedure.cursor, 0);
    assert_eq!(fresh.procedure.version, 0);
    assert_eq!(fresh.role_outcomes.cursor, 0);
    assert_eq!(fresh.role_outcomes.version, 0);
}

#[tokio::test]
async fn failed_synthesis_leaves_version_and_cursor_untouched() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.queue(InferenceTask::Extraction, Ok(INVOICE_ACTION));
    mock.queue(ROLE_SYNTHESIS, Err(InferenceError::Status {
        status: 503,
        body: "overloaded".into(),
    }));
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(frame("m", b"frame-1"), t0).await;
    let failed = wait_for(&mut updates, |result| {
        matches!(result, OutboundResult::CroStatus(RoleOutcomesSnapshot { phase: Some(SynthesisPhase::Failed), .. }))
    })
    .await;
    match failed.result {
        OutboundResult::CroStatus(snapshot) => assert_eq!(snapshot.version, 0),
        other => panic!("unexpected update: {other:?}"),
    }

    let snapshot = engine.lookup("m", t0).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.version, 0);
    assert_eq!(snapshot.role_outcomes.cursor, 0);
    assert!(!snapshot.role_outcomes.in_flight);

    engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    let roles = cro_update(&mut updates).await;
    assert_eq!(roles.version, 1);

    let retry_prompt = &mock.calls_for(ROLE_SYNTHESIS)[1].prompt;
    assert!(retry_prompt.contains("click Save on the profile form"));
    assert!(retry_prompt.contains("download invoice"));

    let snapshot = engine.lookup("m", t0 + secs(6)).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.cursor, 2);
}

#[tokio::test]
async fn trigger_during_outstanding_synthesis_is_dropped() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.queue(InferenceTask::Extraction, Ok(INVOICE_ACTION));
    mock.hold(ROLE_SYNTHESIS);
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    let first = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(has_cro_generating(&first));
    mock.wait_until_held().await;

    let second = engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    assert!(has_status(&second, SessionStatus::ObservationRecorded));
    assert!(!has_cro_generating(&second));
    assert_eq!(mock.calls_for(ROLE_SYNTHESIS).len(), 1);

    mock.release();
    let roles = cro_update(&mut updates).await;
    assert_eq!(roles.version, 1);

    let snapshot = engine.lookup("m", t0 + secs(6)).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.cursor, 1, "second observation stays pending");
    assert_eq!(snapshot.observation_count, 2);
}

#[tokio::test]
async fn dropped_transcript_trigger_is_retried_by_next_accepted_frame() {
    let mock = MockInference::new();
    mock.hold(PROCEDURE_SYNTHESIS);
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    for (offset, text) in [
        "First open the portal",
        "then configure billing",
        "configure the app",
    ]
    .into_iter()
    .enumerate()
    {
        engine
            .handle_at(transcript("m", text), t0 + secs(offset as u64))
            .await;
    }
    mock.wait_until_held().await;

    let while_busy = engine
        .handle_at(transcript("m", "finally submit the form"), t0 + secs(3))
        .await;
    assert!(!has_sop_generating(&while_busy));

    mock.release();
    assert_eq!(sop_update(&mut updates).await.version, 1);

    let accepted = engine.handle_at(frame("m", b"quiet-frame"), t0 + secs(4)).await;
    assert!(has_status(&accepted, SessionStatus::Observing));
    assert!(has_sop_generating(&accepted));

    let procedure = sop_update(&mut updates).await;
    assert_eq!(procedure.version, 2);
    assert!(mock.calls_for(PROCEDURE_SYNTHESIS)[1]
        .prompt
        .contains("finally submit the form"));
}

#[tokio::test]
async fn timed_out_synthesis_fails_without_mutation_and_retries() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.queue(InferenceTask::Extraction, Ok(INVOICE_ACTION));
    mock.hold(ROLE_SYNTHESIS);
    let config = EngineConfig {
        inference_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let (engine, mut updates) =
        engine_with(&mock, config, Arc::new(StaticPromptStore::default()));
    let t0 = Instant::now();

    let first = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(has_cro_generating(&first));

    let failed = wait_for(&mut updates, |result| {
        matches!(result, OutboundResult::CroStatus(RoleOutcomesSnapshot { phase: Some(SynthesisPhase::Failed), .. }))
    })
    .await;
    match failed.result {
        OutboundResult::CroStatus(snapshot) => assert_eq!(snapshot.version, 0),
        other => panic!("unexpected update: {other:?}"),
    }

    let snapshot = engine.lookup("m", t0).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.version, 0);
    assert_eq!(snapshot.role_outcomes.cursor, 0);
    assert!(!snapshot.role_outcomes.in_flight);

    mock.release();
    engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    assert_eq!(cro_update(&mut updates).await.version, 1);

    let snapshot = engine.lookup("m", t0 + secs(6)).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.cursor, 2);
}

#[tokio::test]
async fn later_synthesis_sees_only_unconsumed_observations() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Extraction, Ok(SAVE_ACTION));
    mock.queue(InferenceTask::Extraction, Ok(INVOICE_ACTION));
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert_eq!(cro_update(&mut updates).await.version, 1);

    engine.handle_at(frame("m", b"frame-2"), t0 + secs(6)).await;
    assert_eq!(cro_update(&mut updates).await.version, 2);

    let calls = mock.calls_for(ROLE_SYNTHESIS);
    assert_eq!(calls.len(), 2);
    assert!(!calls[1].prompt.contains("click Save on the profile form"));
    assert!(calls[1].prompt.contains("download invoice"));
    assert!(calls[1].prompt.contains(ROLE_OUTCOMES_REPLY), "existing document is merged");

    let snapshot = engine.lookup("m", t0 + secs(6)).await.expect("session alive");
    assert_eq!(snapshot.role_outcomes.cursor, 2);
    assert!(snapshot.role_outcomes.cursor <= snapshot.observation_count);
}

#[tokio::test]
async fn active_template_replaces_built_in_default() {
    let mock = MockInference::new();
    let prompts = StaticPromptStore::default()
        .with_template(DocumentKind::Procedure, "CUSTOM SOP TEMPLATE");
    let (engine, mut updates) = engine_with(&mock, test_config(), Arc::new(prompts));
    let t0 = Instant::now();

    for (offset, text) in [
        "First open the portal",
        "then configure billing",
        "configure the app",
    ]
    .into_iter()
    .enumerate()
    {
        engine
            .handle_at(transcript("m", text), t0 + secs(offset as u64))
            .await;
    }
    sop_update(&mut updates).await;

    let procedure_prompt = &mock.calls_for(PROCEDURE_SYNTHESIS)[0].prompt;
    assert!(procedure_prompt.starts_with("CUSTOM SOP TEMPLATE"));

    let roles_prompt = &mock.calls_for(ROLE_SYNTHESIS)[0].prompt;
    assert!(roles_prompt.starts_with(prompts::default_template(DocumentKind::RoleOutcomes)));
}

#[tokio::test]
async fn diagram_failure_still_delivers_procedure() {
    let mock = MockInference::new();
    mock.queue(InferenceTask::Diagram, Ok("Sorry, I cannot draw that."));
    let (engine, mut updates) = engine(&mock);
    let t0 = Instant::now();

    for (offset, text) in [
        "First open the portal",
        "then configure billing",
        "configure the app",
    ]
    .into_iter()
    .enumerate()
    {
        engine
            .handle_at(transcript("m", text), t0 + secs(offset as u64))
            .await;
    }

    let procedure = sop_update(&mut updates).await;
    assert_eq!(procedure.version, 1);
    assert!(procedure.diagram.is_none());
}

#[tokio::test]
async fn transcript_flags_limit_which_documents_run() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);

    let updates = engine
        .handle(InboundMessage::Transcript {
            meeting_id: "m".into(),
            text: "First open the portal and then configure billing for the team".into(),
            speaker: "alex".into(),
            is_final: true,
            generate_procedure: true,
            generate_role_outcomes: false,
        })
        .await;

    assert!(has_status(&updates, SessionStatus::TranscriptBuffered));
    assert!(!has_cro_generating(&updates));
    assert!(mock.calls_for(ROLE_SYNTHESIS).is_empty());
}

#[tokio::test]
async fn missing_inference_fails_fast_without_session() {
    let (engine, _updates) = LiveEngine::new(
        test_config(),
        None,
        Arc::new(StaticPromptStore::default()),
    );

    let updates = engine.handle(frame("m", b"frame-1")).await;
    assert!(matches!(
        results(&updates)[..],
        [OutboundResult::Error { .. }]
    ));
    assert_eq!(engine.active_sessions().await, 0);

    let chat = engine
        .handle(InboundMessage::Text {
            meeting_id: "m".into(),
            text: "hello".into(),
        })
        .await;
    assert!(matches!(results(&chat)[..], [OutboundResult::Error { .. }]));

    let buffered = engine.handle(transcript("m", "first open the portal")).await;
    assert!(has_status(&buffered, SessionStatus::TranscriptBuffered));
    assert!(!has_cro_generating(&buffered));
}

#[tokio::test]
async fn undecodable_frame_is_reported() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);

    let updates = engine
        .handle(InboundMessage::Video {
            meeting_id: "m".into(),
            data: "%%% not base64 %%%".into(),
            mime_type: "image/jpeg".into(),
        })
        .await;

    match results(&updates)[..] {
        [OutboundResult::Error { message }] => assert!(message.contains("invalid video payload")),
        ref other => panic!("unexpected results: {other:?}"),
    }
    assert!(mock.calls_for(InferenceTask::Extraction).is_empty());
}

#[tokio::test]
async fn extraction_failure_is_an_error_and_gate_still_advances() {
    let mock = MockInference::new();
    mock.queue(
        InferenceTask::Extraction,
        Err(InferenceError::Transport("connection reset".into())),
    );
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    let failed = engine.handle_at(frame("m", b"frame-1"), t0).await;
    assert!(matches!(results(&failed)[..], [OutboundResult::Error { .. }]));

    let soon = engine.handle_at(frame("m", b"frame-2"), t0 + secs(2)).await;
    assert!(has_status(&soon, SessionStatus::Skipped));

    let snapshot = engine.lookup("m", t0 + secs(2)).await.expect("session alive");
    assert_eq!(snapshot.observation_count, 0);
}

#[tokio::test]
async fn chat_uses_persona_and_procedure_context() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);

    let updates = engine
        .handle(InboundMessage::Text {
            meeting_id: "m".into(),
            text: "What did we cover?".into(),
        })
        .await;

    assert_eq!(
        results(&updates),
        vec![&OutboundResult::Text {
            text: "Happy to help.".into()
        }]
    );
    let chat = &mock.calls_for(InferenceTask::Chat)[0];
    assert_eq!(chat.prompt, "What did we cover?");
    assert!(chat
        .system
        .as_deref()
        .is_some_and(|system| system.contains("meeting assistant")));
}

#[tokio::test]
async fn transcribed_audio_is_returned_without_touching_sessions() {
    let mock = MockInference::new();
    let (engine, mut updates) = engine(&mock);

    let replies = engine
        .handle(InboundMessage::AudioTranscribe {
            meeting_id: "m".into(),
            data: "UklGRg==".into(),
            mime_type: "audio/wav".into(),
        })
        .await;

    assert_eq!(
        results(&replies),
        vec![&OutboundResult::Transcript {
            text: "first open the admin portal".into(),
            speaker: "user".into(),
            is_final: true,
        }]
    );

    let request = &mock.calls_for(InferenceTask::Transcription)[0];
    let media = request.media.as_ref().expect("audio attached");
    assert_eq!(media.mime_type, "audio/wav");

    assert!(engine.snapshot("m").await.is_none());
    assert!(engine.observations("m").await.is_none());
    assert_eq!(engine.active_sessions().await, 0);
    assert_quiet(&mut updates, Duration::from_millis(100), |_| true).await;
}

#[tokio::test]
async fn chat_after_stop_does_not_revive_session() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(start("m"), t0).await;
    engine
        .handle_at(control("m", ControlAction::Stop), t0 + secs(1))
        .await;

    let replies = engine
        .handle_at(
            InboundMessage::Text {
                meeting_id: "m".into(),
                text: "hi".into(),
            },
            t0 + secs(2),
        )
        .await;

    assert!(matches!(replies[0].result, OutboundResult::Text { .. }));
    assert_eq!(engine.active_sessions().await, 0);
    let chat = &mock.calls_for(InferenceTask::Chat)[0];
    assert!(chat
        .system
        .as_deref()
        .is_some_and(|system| !system.contains("procedure captured so far")));
}

#[tokio::test]
async fn chat_does_not_keep_idle_meeting_alive() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(start("m"), t0).await;
    engine
        .handle_at(
            InboundMessage::Text {
                meeting_id: "m".into(),
                text: "still there?".into(),
            },
            t0 + secs(9 * 60),
        )
        .await;

    assert!(engine.lookup("m", t0 + secs(11 * 60)).await.is_none());
}

#[tokio::test]
async fn control_messages_manage_lifecycle() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    let pong = engine.handle_at(control("m", ControlAction::Ping), t0).await;
    assert!(has_status(&pong, SessionStatus::Pong));
    assert_eq!(engine.active_sessions().await, 0, "ping never creates a session");

    let started = engine
        .handle_at(
            InboundMessage::Control {
                meeting_id: "m".into(),
                action: ControlAction::Start,
                record: RecordRef::Persisted { id: "mtg-7".into() },
            },
            t0,
        )
        .await;
    assert!(has_status(&started, SessionStatus::Started));
    assert_eq!(
        engine.lookup("m", t0).await.expect("started").record,
        RecordRef::Persisted { id: "mtg-7".into() }
    );

    engine
        .handle_at(control("m", ControlAction::Ping), t0 + secs(9 * 60))
        .await;
    assert!(
        engine.lookup("m", t0 + secs(15 * 60)).await.is_some(),
        "ping keeps the session alive"
    );

    assert!(engine.end_meeting("m").await);
    assert!(!engine.end_meeting("m").await);
}

#[tokio::test]
async fn sweep_reaps_idle_meetings_only() {
    let mock = MockInference::new();
    let (engine, _updates) = engine(&mock);
    let t0 = Instant::now();

    engine.handle_at(start("quiet"), t0).await;
    engine.handle_at(start("busy"), t0 + secs(8 * 60)).await;

    let reaped = engine.reap_idle(t0 + secs(11 * 60)).await;
    assert_eq!(reaped, vec!["quiet".to_string()]);
    assert_eq!(engine.active_sessions().await, 1);
}

//! Verification workflow tests against a seeded in-memory database

mod helpers;

use std::time::{Duration, Instant};

use helpers::*;
use reloop_api::db::{users, verifications};
use reloop_api::models::{Decision, FailureKind, RunnerMove, SERVICE_BUSY_REASONING};
use reloop_api::services::WorkflowError;
use reloop_common::db::{SessionStatus, VerificationRecordStatus};
use reloop_common::events::{ComponentStatus, ReloopEvent};

async fn xp_of(state: &reloop_api::AppState, user_id: uuid::Uuid) -> i64 {
    users::get_profile(&state.db, user_id).await.unwrap().unwrap().xp
}

async fn verification_rows(state: &reloop_api::AppState, user_id: uuid::Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM component_verifications WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(&state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mismatch_records_rejection_without_xp() {
    let state = seeded_state(StubVision::scripted(vec![mismatch()]), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "asha@example.com", "Asha").await;
    let display = uuid(PIXEL_DISPLAY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let mut rx = state.event_bus.subscribe();

    let accepted = state
        .workflow
        .submit_photo(session.session_id, display, Some(user_id), png_photo())
        .await
        .unwrap();
    assert_eq!(accepted.status, ComponentStatus::Verifying);
    assert_eq!((accepted.width, accepted.height), (32, 24));

    match wait_for_verdict(&mut rx, display).await {
        ReloopEvent::ComponentStatusChanged { new_status, reasoning, .. } => {
            assert_eq!(new_status, ComponentStatus::Failed);
            assert_eq!(reasoning.as_deref(), Some("This is a charging cable"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(xp_of(&state, user_id).await, 0);
    assert_eq!(verification_rows(&state, user_id).await, 1);
    let row = verifications::get_verification(&state.db, user_id, display)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, VerificationRecordStatus::Rejected);
    assert_eq!(row.xp_awarded, 0);
    assert!(row.verified_at.is_none());

    let view = state.workflow.completion_view(session.session_id, Some(user_id)).await.unwrap();
    let display_view = view.components.iter().find(|c| c.component_id == display).unwrap();
    assert_eq!(display_view.failure, Some(FailureKind::Mismatch));
    assert!(display_view.bypass_available);
}

#[tokio::test]
async fn test_quota_then_bypass_awards_exactly_once() {
    let state = seeded_state(StubVision::scripted(vec![quota()]), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "ravi@example.com", "Ravi").await;
    let battery = uuid(PIXEL_BATTERY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let mut rx = state.event_bus.subscribe();
    state
        .workflow
        .submit_photo(session.session_id, battery, Some(user_id), png_photo())
        .await
        .unwrap();
    wait_for_verdict(&mut rx, battery).await;

    let view = state
        .workflow
        .bypass(session.session_id, battery, Some(user_id))
        .await
        .unwrap();
    assert_eq!(view.status, ComponentStatus::Verified);
    assert!(!view.bypass_available);

    assert_eq!(xp_of(&state, user_id).await, 250);
    let row = verifications::get_verification(&state.db, user_id, battery)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, VerificationRecordStatus::Verified);
    assert!(row.manual_verified);
    assert_eq!(row.xp_awarded, 250);

    // Already verified: no second bypass
    let again = state.workflow.bypass(session.session_id, battery, Some(user_id)).await;
    assert!(matches!(again, Err(WorkflowError::BypassUnavailable)));
    assert_eq!(xp_of(&state, user_id).await, 250);
}

#[tokio::test]
async fn test_bypass_requires_failure() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();

    let result = state
        .workflow
        .bypass(session.session_id, uuid(PIXEL_CAMERA_ID), None)
        .await;
    assert!(matches!(result, Err(WorkflowError::BypassUnavailable)));
}

#[tokio::test]
async fn test_repeat_success_keeps_one_row() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "meera@example.com", "Meera").await;
    let display = uuid(PIXEL_DISPLAY_ID);
    let mut rx = state.event_bus.subscribe();

    for _ in 0..2 {
        let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
        state
            .workflow
            .submit_photo(session.session_id, display, Some(user_id), png_photo())
            .await
            .unwrap();
        wait_for_verdict(&mut rx, display).await;
    }

    assert_eq!(xp_of(&state, user_id).await, 500);
    assert_eq!(verification_rows(&state, user_id).await, 1);
}

#[tokio::test]
async fn test_verified_component_cannot_be_resubmitted() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();
    let camera = uuid(PIXEL_CAMERA_ID);
    let mut rx = state.event_bus.subscribe();

    state
        .workflow
        .submit_photo(session.session_id, camera, None, png_photo())
        .await
        .unwrap();
    wait_for_verdict(&mut rx, camera).await;

    // Verified components cannot be re-submitted
    let again = state
        .workflow
        .submit_photo(session.session_id, camera, None, png_photo())
        .await;
    assert!(matches!(again, Err(WorkflowError::Transition(_))));
}

#[tokio::test]
async fn test_corrupt_photo_is_rejected_before_classification() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();

    let result = state
        .workflow
        .submit_photo(session.session_id, uuid(PIXEL_CAMERA_ID), None, b"not an image".to_vec())
        .await;
    assert!(matches!(result, Err(WorkflowError::Image(_))));

    let view = state.workflow.completion_view(session.session_id, None).await.unwrap();
    assert!(view
        .components
        .iter()
        .all(|c| c.status == ComponentStatus::Idle));
}

#[tokio::test]
async fn test_safety_gate_blocks_until_acknowledged() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();
    let id = session.session_id;
    assert!(session.pending_gate.is_none());

    let first = state.workflow.advance(id, None).await.unwrap();
    assert_eq!(first.outcome, RunnerMove::Advanced { index: 1 });

    let blocked = state.workflow.advance(id, None).await.unwrap();
    assert!(matches!(blocked.outcome, RunnerMove::GateRequired { index: 2, .. }));
    assert_eq!(blocked.session.current_index, 1);
    assert!(blocked.session.pending_gate.is_some());

    // Cancelling keeps the runner where it was
    let cancelled = state.workflow.cancel_gate(id, None).await.unwrap();
    assert_eq!(cancelled.current_index, 1);
    assert!(cancelled.pending_gate.is_none());
    assert!(state.workflow.acknowledge_gate(id, None).await.is_err());

    state.workflow.advance(id, None).await.unwrap();
    let entered = state.workflow.acknowledge_gate(id, None).await.unwrap();
    assert_eq!(entered.outcome, RunnerMove::Advanced { index: 2 });

    // Acknowledged gates stay open when revisited
    state.workflow.retreat(id, None).await.unwrap();
    let revisit = state.workflow.advance(id, None).await.unwrap();
    assert_eq!(revisit.outcome, RunnerMove::Advanced { index: 2 });

    state.workflow.advance(id, None).await.unwrap();
    let done = state.workflow.advance(id, None).await.unwrap();
    assert_eq!(done.outcome, RunnerMove::Finished);
    assert_eq!(done.route, Some(format!("/api/sessions/{}/completion", id)));
}

#[tokio::test]
async fn test_finish_routes_to_marketplace_when_reselling() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "kabir@example.com", "Kabir").await;
    let display = uuid(PIXEL_DISPLAY_ID);
    let battery = uuid(PIXEL_BATTERY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let id = session.session_id;
    assert!(session.persisted);

    let mut rx = state.event_bus.subscribe();
    for component in [display, battery] {
        state
            .workflow
            .submit_photo(id, component, Some(user_id), png_photo())
            .await
            .unwrap();
        wait_for_verdict(&mut rx, component).await;
    }

    state.workflow.decide(id, display, Some(user_id), Some(Decision::Resell)).await.unwrap();
    state.workflow.decide(id, battery, Some(user_id), Some(Decision::Donate)).await.unwrap();

    let outcome = state.workflow.finish(id, Some(user_id)).await.unwrap();
    assert_eq!(outcome.route, "/marketplace");
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.bonus_xp_awarded, 500);

    let resell = outcome.resell.unwrap();
    assert_eq!(resell.components.len(), 1);
    assert_eq!(resell.components[0].name, "OLED Display Assembly");
    assert_eq!(resell.components[0].condition, "Excellent");
    assert_eq!(resell.components[0].suggested_price_inr, 2400);
    assert_eq!(outcome.donate.unwrap().components[0].component_id, battery);

    let row = reloop_api::db::sessions::load_session(&state.db, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, SessionStatus::Completed);
    assert!(row.completed_at.is_some());

    assert!(state.workflow.pending_resell(user_id).await.is_some());
    assert!(state.workflow.pending_donate(user_id).await.is_some());
    assert_eq!(xp_of(&state, user_id).await, 250 * 2 + 500);

    assert_eq!(state.workflow.live_session_count().await, 0);
    let again = state.workflow.finish(id, Some(user_id)).await;
    assert!(matches!(again, Err(WorkflowError::AlreadyCompleted(_))));
    assert_eq!(xp_of(&state, user_id).await, 1000);
}

#[tokio::test]
async fn test_finish_without_resale_routes_to_leaderboard() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "tara@example.com", "Tara").await;

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let mut rx = state.event_bus.subscribe();

    let outcome = state.workflow.finish(session.session_id, Some(user_id)).await.unwrap();
    assert_eq!(outcome.route, "/leaderboard");
    assert!(outcome.resell.is_none());
    assert!(outcome.donate.is_none());

    let event = wait_for_event(&mut rx, |e| matches!(e, ReloopEvent::SessionCompleted { .. })).await;
    if let ReloopEvent::SessionCompleted { completed_at, .. } = event {
        assert_eq!(completed_at, outcome.completed_at);
    }
    assert!(state.workflow.pending_resell(user_id).await.is_none());
}

#[tokio::test]
async fn test_decision_requires_verified_component() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();

    let result = state
        .workflow
        .decide(session.session_id, uuid(PIXEL_DISPLAY_ID), None, Some(Decision::Recycle))
        .await;
    assert!(matches!(result, Err(WorkflowError::NotVerified(_))));
}

#[tokio::test]
async fn test_sessions_are_private_to_their_owner() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;
    let (owner, _) = sign_up(&state, "owner@example.com", "Owner").await;
    let (other, _) = sign_up(&state, "other@example.com", "Other").await;

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(owner)).await.unwrap();

    assert!(matches!(
        state.workflow.snapshot(session.session_id, Some(other)).await,
        Err(WorkflowError::SessionNotFound(_))
    ));
    assert!(matches!(
        state.workflow.snapshot(session.session_id, None).await,
        Err(WorkflowError::SessionNotFound(_))
    ));
    assert!(state.workflow.snapshot(session.session_id, Some(owner)).await.is_ok());
}

#[tokio::test]
async fn test_unknown_device_and_discard() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;

    let missing = state.workflow.start_session(uuid::Uuid::new_v4(), None).await;
    assert!(matches!(missing, Err(WorkflowError::DeviceNotFound(_))));

    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();
    assert_eq!(state.workflow.live_session_count().await, 1);
    state.workflow.discard(session.session_id, None).await.unwrap();
    assert_eq!(state.workflow.live_session_count().await, 0);
}

#[tokio::test]
async fn test_quota_marks_service_busy_and_records_rejection() {
    let state = seeded_state(StubVision::scripted(vec![quota()]), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "nisha@example.com", "Nisha").await;
    let camera = uuid(PIXEL_CAMERA_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let mut rx = state.event_bus.subscribe();
    state
        .workflow
        .submit_photo(session.session_id, camera, Some(user_id), png_photo())
        .await
        .unwrap();

    match wait_for_verdict(&mut rx, camera).await {
        ReloopEvent::ComponentStatusChanged { new_status, reasoning, .. } => {
            assert_eq!(new_status, ComponentStatus::Failed);
            assert_eq!(reasoning.as_deref(), Some(SERVICE_BUSY_REASONING));
        }
        other => panic!("unexpected event {:?}", other),
    }

    let view = state.workflow.completion_view(session.session_id, Some(user_id)).await.unwrap();
    let camera_view = view.components.iter().find(|c| c.component_id == camera).unwrap();
    assert_eq!(camera_view.status, ComponentStatus::Failed);
    assert_eq!(camera_view.failure, Some(FailureKind::ServiceBusy));
    assert_eq!(camera_view.reasoning.as_deref(), Some(SERVICE_BUSY_REASONING));
    assert!(camera_view.bypass_available);

    // The failed attempt is on record before any bypass
    let row = verifications::get_verification(&state.db, user_id, camera)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, VerificationRecordStatus::Rejected);
    assert_eq!(row.xp_awarded, 0);
    assert!(!row.manual_verified);
    assert_eq!(xp_of(&state, user_id).await, 0);
}

#[tokio::test]
async fn test_busy_verdict_waits_for_configured_delay() {
    let mut config = test_config();
    config.workflow.busy_delay_ms = 300;
    let state = seeded_state_with(StubVision::scripted(vec![quota()]), StubPricing::unreachable(), &config).await;
    let battery = uuid(PIXEL_BATTERY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();
    let mut rx = state.event_bus.subscribe();
    let started = Instant::now();
    state
        .workflow
        .submit_photo(session.session_id, battery, None, png_photo())
        .await
        .unwrap();

    let view = state.workflow.completion_view(session.session_id, None).await.unwrap();
    let pending = view.components.iter().find(|c| c.component_id == battery).unwrap();
    assert_eq!(pending.status, ComponentStatus::Verifying);

    wait_for_verdict(&mut rx, battery).await;
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_components_verify_concurrently() {
    let vision = StubVision::default().with_delay(Duration::from_millis(200));
    let state = seeded_state(vision, StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "dev@example.com", "Dev").await;
    let display = uuid(PIXEL_DISPLAY_ID);
    let battery = uuid(PIXEL_BATTERY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let id = session.session_id;
    let mut rx = state.event_bus.subscribe();

    for component in [display, battery] {
        state
            .workflow
            .submit_photo(id, component, Some(user_id), png_photo())
            .await
            .unwrap();
    }

    let view = state.workflow.completion_view(id, Some(user_id)).await.unwrap();
    let verifying = view
        .components
        .iter()
        .filter(|c| c.status == ComponentStatus::Verifying)
        .count();
    assert_eq!(verifying, 2);

    let mut resolved = Vec::new();
    while resolved.len() < 2 {
        if let ReloopEvent::ComponentStatusChanged { component_id, new_status, .. } = wait_for_event(&mut rx, |e| {
            matches!(e, ReloopEvent::ComponentStatusChanged { old_status: ComponentStatus::Verifying, .. })
        })
        .await
        {
            assert_eq!(new_status, ComponentStatus::Verified);
            resolved.push(component_id);
        }
    }
    resolved.sort();
    let mut expected = vec![display, battery];
    expected.sort();
    assert_eq!(resolved, expected);

    assert_eq!(xp_of(&state, user_id).await, 500);
    assert_eq!(verification_rows(&state, user_id).await, 2);
}

#[tokio::test]
async fn test_failed_component_can_be_resubmitted() {
    let state = seeded_state(StubVision::scripted(vec![mismatch(), verified()]), StubPricing::unreachable()).await;
    let (user_id, _) = sign_up(&state, "ira@example.com", "Ira").await;
    let display = uuid(PIXEL_DISPLAY_ID);

    let session = state.workflow.start_session(uuid(PIXEL_ID), Some(user_id)).await.unwrap();
    let id = session.session_id;
    let mut rx = state.event_bus.subscribe();

    state
        .workflow
        .submit_photo(id, display, Some(user_id), png_photo())
        .await
        .unwrap();
    wait_for_verdict(&mut rx, display).await;

    let retry = state
        .workflow
        .submit_photo(id, display, Some(user_id), png_photo())
        .await
        .unwrap();
    assert_eq!(retry.status, ComponentStatus::Verifying);

    match wait_for_verdict(&mut rx, display).await {
        ReloopEvent::ComponentStatusChanged { new_status, .. } => assert_eq!(new_status, ComponentStatus::Verified),
        other => panic!("unexpected event {:?}", other),
    }

    let view = state.workflow.completion_view(id, Some(user_id)).await.unwrap();
    let display_view = view.components.iter().find(|c| c.component_id == display).unwrap();
    assert!(display_view.failure.is_none());
    assert!(!display_view.bypass_available);

    assert_eq!(verification_rows(&state, user_id).await, 1);
    let row = verifications::get_verification(&state.db, user_id, display)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, VerificationRecordStatus::Verified);
    assert_eq!(row.xp_awarded, 250);
    assert_eq!(xp_of(&state, user_id).await, 250);
}

#[tokio::test]
async fn test_finish_releases_live_sessions() {
    let state = seeded_state(StubVision::default(), StubPricing::unreachable()).await;

    let mut ids = Vec::new();
    for _ in 0..5 {
        let session = state.workflow.start_session(uuid(PIXEL_ID), None).await.unwrap();
        state.workflow.valuation(session.session_id, None).await.unwrap();
        ids.push(session.session_id);
    }
    assert_eq!(state.workflow.live_session_count().await, 5);

    for id in &ids {
        state.workflow.finish(*id, None).await.unwrap();
    }
    assert_eq!(state.workflow.live_session_count().await, 0);

    // Anonymous sessions leave nothing behind to finish again
    let again = state.workflow.finish(ids[0], None).await;
    assert!(matches!(again, Err(WorkflowError::SessionNotFound(_))));
}

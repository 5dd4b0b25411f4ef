// Progression and attribution scenarios through the service surface,
// backed by an on-disk store in a temp directory.

use std::sync::Arc;

use studyloop_core::attribution::{Attribution, ConfidenceTier};
use studyloop_core::config::Config;
use studyloop_core::conversation::Role;
use studyloop_core::engagement::EventKind;
use studyloop_core::store::{AttemptKind, Store};
use studyloop_core::{Error, TutorService};

fn service_with_temp_store() -> (TutorService, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("studyloop.db")).unwrap());
    let service = TutorService::with_store(Config::default(), store).unwrap();
    (service, dir)
}

#[tokio::test]
async fn two_stage_unlock_progression() {
    let (service, _dir) = service_with_temp_store();
    let session = service.start_session("learner-1", Some("topic-7"), None).await.unwrap();

    // 5 + 10 + 10 + 3 + 1 = 29: nothing unlocks
    for (kind, points) in [
        (EventKind::Message, None),
        (EventKind::CodeExecution, None),
        (EventKind::CodeExecution, None),
        (EventKind::Interaction, None),
        (EventKind::Time, None),
    ] {
        let outcome = service
            .record_engagement_event(&session.session_id, kind, points, None)
            .await
            .unwrap();
        assert!(!outcome.quiz_unlocked);
        assert!(!outcome.practice_unlocked);
    }

    // One more point: quiz unlocks at exactly 30
    let outcome = service
        .record_engagement_event(&session.session_id, EventKind::Time, None, None)
        .await
        .unwrap();
    assert_eq!(outcome.score, 30);
    assert!(outcome.quiz_unlocked);
    assert!(!outcome.practice_unlocked);
    assert_eq!(outcome.points_to_practice, 40);

    // Push to 70: practice unlocks
    let outcome = service
        .record_engagement_event(&session.session_id, EventKind::Interaction, Some(40), None)
        .await
        .unwrap();
    assert!(outcome.practice_unlocked);
    assert_eq!(outcome.points_to_practice, 0);
}

#[tokio::test]
async fn practice_unlocks_directly_from_started() {
    let (service, _dir) = service_with_temp_store();
    let session = service.start_session("learner-1", None, None).await.unwrap();

    let outcome = service
        .record_engagement_event(&session.session_id, EventKind::Interaction, Some(70), None)
        .await
        .unwrap();
    // A single large event crosses both thresholds in one transition
    assert!(outcome.quiz_unlocked);
    assert!(outcome.practice_unlocked);
}

#[tokio::test]
async fn ended_session_rejects_further_events() {
    let (service, _dir) = service_with_temp_store();
    let session = service.start_session("learner-1", None, None).await.unwrap();
    service.end_session(&session.session_id).await.unwrap();

    let result = service
        .record_engagement_event(&session.session_id, EventKind::Message, None, None)
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn attribution_tiers_across_scenarios() {
    let (service, _dir) = service_with_temp_store();
    let store = service.store().clone();

    // Scenario 1: explicit link
    let s1 = service.start_session("learner-1", None, None).await.unwrap();
    let message_id = service
        .record_chat_message(&s1.session_id, Role::Assistant, Some("together"), "use a loop")
        .await
        .unwrap();
    let attempt = store
        .insert_attempt(
            "learner-1",
            Some(&s1.session_id),
            AttemptKind::Quiz,
            Some(0.9),
            true,
            Some(45),
            Some(&message_id),
        )
        .await
        .unwrap();
    match service.resolve_attribution(&attempt.attempt_id).await.unwrap() {
        Attribution::Resolved(record) => {
            assert_eq!(record.tier, ConfidenceTier::Explicit);
            assert_eq!(record.provider, "together");
        }
        other => panic!("expected Resolved, got {other:?}"),
    }

    // Scenario 2: single provider in session, no explicit link
    let s2 = service.start_session("learner-2", None, None).await.unwrap();
    service
        .record_chat_message(&s2.session_id, Role::Assistant, Some("gemini"), "hint")
        .await
        .unwrap();
    let attempt = store
        .insert_attempt(
            "learner-2",
            Some(&s2.session_id),
            AttemptKind::Practice,
            Some(1.0),
            true,
            Some(300),
            None,
        )
        .await
        .unwrap();
    match service.resolve_attribution(&attempt.attempt_id).await.unwrap() {
        Attribution::Resolved(record) => {
            assert_eq!(record.tier, ConfidenceTier::Session);
            assert_eq!(record.provider, "gemini");
        }
        other => panic!("expected Resolved, got {other:?}"),
    }

    // Scenario 3: multi-provider session falls back to temporal
    let s3 = service.start_session("learner-3", None, None).await.unwrap();
    service
        .record_chat_message(&s3.session_id, Role::Assistant, Some("gemini"), "first")
        .await
        .unwrap();
    service
        .record_chat_message(&s3.session_id, Role::Assistant, Some("together"), "latest")
        .await
        .unwrap();
    let attempt = store
        .insert_attempt(
            "learner-3",
            Some(&s3.session_id),
            AttemptKind::Quiz,
            Some(0.6),
            false,
            Some(80),
            None,
        )
        .await
        .unwrap();
    match service.resolve_attribution(&attempt.attempt_id).await.unwrap() {
        Attribution::Resolved(record) => {
            assert_eq!(record.tier, ConfidenceTier::Temporal);
            assert_eq!(record.provider, "together");
            assert!(record.delay_seconds.is_some());
        }
        other => panic!("expected Resolved, got {other:?}"),
    }

    // Scenario 4: no chat history at all stays unattributed
    let s4 = service.start_session("learner-4", None, None).await.unwrap();
    let attempt = store
        .insert_attempt(
            "learner-4",
            Some(&s4.session_id),
            AttemptKind::Quiz,
            None,
            false,
            None,
            None,
        )
        .await
        .unwrap();
    let attribution = service.resolve_attribution(&attempt.attempt_id).await.unwrap();
    assert_eq!(attribution, Attribution::Unattributed);
    assert!(store.get_attribution(&attempt.attempt_id).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_events_never_lose_increments() {
    let (service, _dir) = service_with_temp_store();
    let service = Arc::new(service);
    let session = service.start_session("learner-1", None, None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = service.clone();
        let session_id = session.session_id.clone();
        handles.push(tokio::spawn(async move {
            service
                .record_engagement_event(&session_id, EventKind::Message, Some(1), None)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = service
        .store()
        .get_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.engagement_score, 20);
}

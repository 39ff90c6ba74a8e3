//! Scan ingestion pipeline tests

mod helpers;

use gymgate_common::scan::{DEFAULT_DENIAL_REASON, DEFAULT_MEMBER_NAME};
use gymgate_common::{ScanAttempt, ScanOutcome, ScanResult};
use gymgate_station::feedback::{Cue, RecordingFeedback};
use gymgate_station::ingest::{AccessVerifier, IngestSettings, ScanPipeline};
use gymgate_station::presentation::ResultPresenter;
use helpers::{MockPublisher, MockVerifier};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    pipeline: ScanPipeline,
    verifier: Arc<MockVerifier>,
    publisher: Arc<MockPublisher>,
    feedback: Arc<RecordingFeedback>,
    presenter: ResultPresenter,
}

fn harness_with(
    verifier: MockVerifier,
    publisher: MockPublisher,
    settings: IngestSettings,
) -> Harness {
    let verifier = Arc::new(verifier);
    let publisher = Arc::new(publisher);
    let feedback = Arc::new(RecordingFeedback::default());
    let presenter = ResultPresenter::new(Duration::from_secs(4));
    let pipeline = ScanPipeline::new(
        "gym-1",
        Uuid::new_v4(),
        verifier.clone(),
        publisher.clone(),
        feedback.clone(),
        presenter.clone(),
        settings,
    );
    Harness {
        pipeline,
        verifier,
        publisher,
        feedback,
        presenter,
    }
}

fn harness(verifier: MockVerifier) -> Harness {
    harness_with(verifier, MockPublisher::default(), IngestSettings::default())
}

fn outcome(presenter: &ResultPresenter) -> Option<ScanOutcome> {
    presenter.current().map(|r: ScanResult| r.outcome)
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_scans_within_cooldown_verify_once() {
    let h = harness(MockVerifier::granting("Amina"));

    assert!(h.pipeline.submit(ScanAttempt::new("tok")));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!h.pipeline.submit(ScanAttempt::new("tok")));
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(!h.pipeline.submit(ScanAttempt::new("tok")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.verifier.calls(), vec!["tok"]);
}

#[tokio::test(start_paused = true)]
async fn test_scan_accepted_again_after_cooldown() {
    let h = harness(MockVerifier::granting("Amina"));

    assert!(h.pipeline.submit(ScanAttempt::new("tok")));
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert!(h.pipeline.submit(ScanAttempt::new("tok")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.verifier.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_verification_blocks_new_scans() {
    let h = harness(MockVerifier::granting("Amina").with_delay(Duration::from_secs(5)));

    assert!(h.pipeline.submit(ScanAttempt::new("first")));
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(h.pipeline.is_verifying());
    assert!(!h.pipeline.submit(ScanAttempt::new("second")));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!h.pipeline.is_verifying());
    assert!(h.pipeline.submit(ScanAttempt::new("third")));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.verifier.calls(), vec!["first", "third"]);
}

#[tokio::test(start_paused = true)]
async fn test_granted_flow_presents_cues_publishes_and_clears() {
    let h = harness(MockVerifier::granting("Amina Benali"));

    h.pipeline.submit(ScanAttempt::new("tok"));
    assert_eq!(outcome(&h.presenter), Some(ScanOutcome::Verifying));

    tokio::time::sleep(Duration::from_millis(100)).await;
    match outcome(&h.presenter) {
        Some(ScanOutcome::Granted { member_name, subscription_expiry, .. }) => {
            assert_eq!(member_name, "Amina Benali");
            assert!(subscription_expiry.is_some());
        }
        other => panic!("expected granted, got {:?}", other),
    }
    assert_eq!(h.feedback.played(), vec![Cue::Granted]);

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].gym_id, "gym-1");
    assert_eq!(events[0].origin, Some(h.pipeline.session_id()));
    assert!(events[0].result.is_granted());

    // Result set at ~50ms, cleared 4s later
    tokio::time::sleep(Duration::from_millis(3900)).await;
    assert!(h.presenter.current().is_some());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.presenter.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_blank_member_name_falls_back() {
    let h = harness(MockVerifier::granting(""));

    h.pipeline.submit(ScanAttempt::new("tok"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(matches!(
        outcome(&h.presenter),
        Some(ScanOutcome::Granted { ref member_name, .. }) if member_name == DEFAULT_MEMBER_NAME
    ));
}

#[tokio::test(start_paused = true)]
async fn test_denial_shows_hub_reason() {
    let h = harness(MockVerifier::rejecting("Membership has expired"));

    h.pipeline.submit(ScanAttempt::new("tok"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        outcome(&h.presenter),
        Some(ScanOutcome::Denied {
            reason: "Membership has expired".to_string()
        })
    );
    assert_eq!(h.feedback.played(), vec![Cue::Denied]);
}

#[tokio::test(start_paused = true)]
async fn test_denial_without_message_uses_generic_reason() {
    let h = harness(MockVerifier::rejecting(""));

    h.pipeline.submit(ScanAttempt::new("tok"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        outcome(&h.presenter),
        Some(ScanOutcome::Denied {
            reason: DEFAULT_DENIAL_REASON.to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_verification_timeout_never_leaves_verifying() {
    let h = harness_with(
        MockVerifier::granting("Amina").with_delay(Duration::from_secs(60)),
        MockPublisher::default(),
        IngestSettings {
            cooldown: Duration::from_secs(3),
            verify_timeout: Duration::from_secs(10),
        },
    );

    h.pipeline.submit(ScanAttempt::new("tok"));
    tokio::time::sleep(Duration::from_millis(9_900)).await;
    assert_eq!(outcome(&h.presenter), Some(ScanOutcome::Verifying));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(outcome(&h.presenter), Some(ScanOutcome::Denied { .. })));
    assert!(!h.pipeline.is_verifying());
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_is_not_surfaced() {
    let h = harness_with(
        MockVerifier::granting("Amina"),
        MockPublisher::failing(),
        IngestSettings::default(),
    );

    h.pipeline.submit(ScanAttempt::new("tok"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.presenter.current().unwrap().is_granted());
    assert!(!h.pipeline.is_verifying());
}

#[tokio::test(start_paused = true)]
async fn test_separate_pipelines_are_independent() {
    let a = harness(MockVerifier::granting("A"));
    let b = harness(MockVerifier::granting("B"));

    assert!(a.pipeline.submit(ScanAttempt::new("tok")));
    assert!(b.pipeline.submit(ScanAttempt::new("tok")));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.verifier.calls().len(), 1);
    assert_eq!(b.verifier.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_decode_callback_feeds_pipeline() {
    let h = harness(MockVerifier::granting("Amina"));
    let callback = h.pipeline.decode_callback();

    callback("tok".to_string());
    callback("tok".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.verifier.calls(), vec!["tok"]);
}

#[tokio::test(start_paused = true)]
async fn test_mock_verifier_is_an_access_verifier() {
    let verifier: Arc<dyn AccessVerifier> = Arc::new(MockVerifier::rejecting("Invalid QR Code"));
    let err = verifier.check_in("gym-1", "x").await.unwrap_err();
    assert_eq!(err.display_reason().as_deref(), Some("Invalid QR Code"));
}

//! Rotation scheduler tests

use celora_kms::registry::{EmergencyRotation, MasterKey, RotationSchedule, StaticKeyRegistry};
use celora_kms::store::MemoryVersionStore;
use celora_kms::{EnvelopeKms, ExecutionContext, KmsError, RotationReason, RotationScheduler};
use std::sync::Arc;
use std::time::Duration;

fn emergency_schedule(triggers: &[&str]) -> RotationSchedule {
    RotationSchedule {
        emergency: EmergencyRotation {
            enabled: true,
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
        },
        ..RotationSchedule::default()
    }
}

async fn kms_with_schedule(schedule: Option<RotationSchedule>) -> Arc<EnvelopeKms> {
    let registry = Arc::new(StaticKeyRegistry::new(
        Some(MasterKey::new("mk-1", [9u8; 32])),
        schedule,
    ));
    let kms = Arc::new(EnvelopeKms::new(
        registry,
        Arc::new(MemoryVersionStore::new()),
        ExecutionContext::Server,
    ));
    kms.initialize().await.unwrap();
    kms
}

#[tokio::test]
async fn test_manual_rotation_records_event() {
    let kms = kms_with_schedule(None).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    let status = scheduler.get_status().await;
    assert_eq!(status.total_rotations, 0);
    assert!(status.last_check.is_none());

    let result = scheduler.manual_rotation().await.unwrap();
    assert_eq!(result.new_version, 2);
    assert_eq!(result.reason, RotationReason::Manual);

    let status = scheduler.get_status().await;
    assert_eq!(status.total_rotations, 1);
    assert!(status.last_check.is_some());

    let history = scheduler.get_rotation_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, RotationReason::Manual);
    assert!(history[0].trigger.is_none());
}

#[tokio::test]
async fn test_rotation_history_is_bounded() {
    let kms = kms_with_schedule(None).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    for _ in 0..150 {
        scheduler.manual_rotation().await.unwrap();
    }

    let history = scheduler.get_rotation_history().await;
    assert_eq!(history.len(), 100);

    // Newest first: 150 rotations on top of version 1 end at version 151,
    // and the trail keeps only the most recent 100 of them.
    assert_eq!(history[0].result.new_version, 151);
    assert_eq!(history[99].result.new_version, 52);

    let status = scheduler.get_status().await;
    assert_eq!(status.total_rotations, 100);
}

#[tokio::test]
async fn test_unmatched_signals_do_not_rotate() {
    let kms = kms_with_schedule(Some(emergency_schedule(&["breach"]))).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    let rotated = scheduler
        .check_emergency_triggers(&["unrelated_signal".to_string()])
        .await
        .unwrap();

    assert!(!rotated);
    assert_eq!(kms.current_version().await, Some(1));
    assert_eq!(scheduler.get_status().await.total_rotations, 0);
}

#[tokio::test]
async fn test_matched_signal_rotates_once() {
    let kms = kms_with_schedule(Some(emergency_schedule(&["breach"]))).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    let rotated = scheduler
        .check_emergency_triggers(&["breach".to_string()])
        .await
        .unwrap();

    assert!(rotated);
    assert_eq!(kms.current_version().await, Some(2));

    let history = scheduler.get_rotation_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, RotationReason::Emergency);
    assert_eq!(history[0].trigger.as_deref(), Some("breach"));
}

#[tokio::test]
async fn test_first_matching_signal_wins() {
    let kms = kms_with_schedule(Some(emergency_schedule(&["breach", "key_compromise"]))).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    let signals = vec![
        "unrelated".to_string(),
        "key_compromise".to_string(),
        "breach".to_string(),
    ];
    assert!(scheduler.check_emergency_triggers(&signals).await.unwrap());

    let history = scheduler.get_rotation_history().await;
    assert_eq!(history[0].trigger.as_deref(), Some("key_compromise"));
}

#[tokio::test]
async fn test_no_schedule_means_no_emergency_rotation() {
    let kms = kms_with_schedule(None).await;
    let scheduler = RotationScheduler::new(Arc::clone(&kms));

    let rotated = scheduler
        .check_emergency_triggers(&["breach".to_string()])
        .await
        .unwrap();
    assert!(!rotated);
    assert_eq!(kms.current_version().await, Some(1));
}

#[tokio::test]
async fn test_manual_rotation_propagates_failure() {
    let registry = Arc::new(StaticKeyRegistry::new(None, None));
    let kms = Arc::new(EnvelopeKms::new(
        registry,
        Arc::new(MemoryVersionStore::new()),
        ExecutionContext::Server,
    ));
    kms.initialize().await.unwrap();
    let scheduler = RotationScheduler::new(kms);

    assert!(matches!(
        scheduler.manual_rotation().await,
        Err(KmsError::NoCurrentKey)
    ));
    assert_eq!(scheduler.get_status().await.total_rotations, 0);
}

#[tokio::test]
async fn test_start_and_stop_lifecycle() {
    let kms = kms_with_schedule(None).await;
    let scheduler = RotationScheduler::with_interval(kms, Duration::from_millis(10_000));

    assert!(!scheduler.get_status().await.is_running);

    scheduler.start().await;
    assert!(scheduler.get_status().await.is_running);

    // Second start is a no-op, not an error.
    scheduler.start().await;
    assert!(scheduler.get_status().await.is_running);

    scheduler.stop().await;
    assert!(!scheduler.get_status().await.is_running);
}

#[tokio::test]
async fn test_start_refused_in_client_context() {
    let registry = Arc::new(StaticKeyRegistry::new(
        Some(MasterKey::new("mk-1", [9u8; 32])),
        None,
    ));
    let kms = Arc::new(EnvelopeKms::new(
        registry,
        Arc::new(MemoryVersionStore::new()),
        ExecutionContext::Client,
    ));
    kms.initialize().await.unwrap();

    let scheduler = RotationScheduler::new(kms);
    scheduler.start().await;
    assert!(!scheduler.get_status().await.is_running);
}

#[tokio::test]
async fn test_timer_survives_failing_rotations() {
    // No master key: every tick reports rotation needed (bootstrap case)
    // and then fails to rotate. The loop must keep running regardless.
    let registry = Arc::new(StaticKeyRegistry::new(None, None));
    let kms = Arc::new(EnvelopeKms::new(
        registry,
        Arc::new(MemoryVersionStore::new()),
        ExecutionContext::Server,
    ));
    kms.initialize().await.unwrap();

    let scheduler = RotationScheduler::with_interval(kms, Duration::from_millis(20));
    scheduler.start().await;

    tokio::time::sleep(Duration::from_millis(120)).await;

    let status = scheduler.get_status().await;
    assert!(status.is_running);
    assert_eq!(status.total_rotations, 0);

    scheduler.stop().await;
}

//! Supervisor module tests.

mod batch_test;
mod fake;

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use app_starter::supervisor::{
        BatchKind, BatchOutcome, BatchReport, EntryFailure, RefreshOutcome, SupervisorError,
        SupervisorEvent, SupervisorOptions, DEFAULT_EVENT_CHANNEL_CAPACITY,
        DEFAULT_POLL_INTERVAL,
    };

    let report = BatchReport::new(BatchKind::Start, 0);
    assert_eq!(report.outcome(), BatchOutcome::Success);

    let _ = EntryFailure {
        path: "/bin/true".into(),
        reason: "test".to_string(),
    };
    let _ = RefreshOutcome::Skipped;
    let _ = SupervisorEvent::EntriesRemoved { count: 0 };
    let _: fn() -> SupervisorError = || SupervisorError::BatchInProgress;

    let options = SupervisorOptions::new("/tmp/apps.toml");
    assert_eq!(options.event_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    assert!(DEFAULT_POLL_INTERVAL.as_secs() >= 1);
}

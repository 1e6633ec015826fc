use std::time::Duration;

use app_starter::registry::{EntryStatus, RegistryError};
use app_starter::supervisor::{BatchKind, BatchOutcome, SupervisorError, SupervisorEvent};

use super::fake::Fixture;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn start_launches_enabled_stopped_entries_once() {
    let fx = Fixture::with_entries(&[("a", true), ("b", false)]).await;

    let report = fx.supervisor.start_all().await.unwrap().wait().await.unwrap();
    assert_eq!(report.kind, BatchKind::Start);
    assert_eq!(report.entries, 2);
    assert_eq!(report.attempted, 1);
    assert!(report.is_success());
    assert_eq!(report.summary(), "Applications started");
    assert_eq!(fx.table.pids_of(&fx.path("a")).len(), 1);
    assert!(fx.table.pids_of(&fx.path("b")).is_empty());

    // Already running, so a second start launches nothing.
    let again = fx.supervisor.start_all().await.unwrap().wait().await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(fx.table.launches(), 1);
}

#[tokio::test]
async fn start_launches_duplicate_paths_once() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    fx.supervisor.add_entry(fx.path("a")).await.unwrap();
    fx.supervisor.set_enabled(1, true).await.unwrap();

    fx.supervisor.start_all().await.unwrap().wait().await.unwrap();
    assert_eq!(fx.table.launches(), 1);
}

#[tokio::test]
async fn stop_only_kills_enabled_entries() {
    let fx = Fixture::with_entries(&[("a", true), ("b", false)]).await;
    fx.table.spawn(&fx.path("a"));
    fx.table.spawn(&fx.path("b"));

    let report = fx.supervisor.stop_all().await.unwrap().wait().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.summary(), "Applications stopped");
    assert!(fx.table.pids_of(&fx.path("a")).is_empty());
    assert_eq!(fx.table.pids_of(&fx.path("b")).len(), 1);
}

#[tokio::test]
async fn stop_with_nothing_running_succeeds_without_kills() {
    let fx = Fixture::with_entries(&[("a", true)]).await;

    let report = fx.supervisor.stop_all().await.unwrap().wait().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert!(report.is_success());
    assert_eq!(fx.table.terminations(), 0);
}

#[tokio::test]
async fn restart_replaces_the_running_process() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    let old = fx.table.spawn(&fx.path("a"));

    let report = fx
        .supervisor
        .restart_all()
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(report.kind, BatchKind::Restart);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.summary(), "Applications restarted");

    let pids = fx.table.pids_of(&fx.path("a"));
    assert_eq!(pids.len(), 1);
    assert_ne!(pids[0], old);
}

#[tokio::test]
async fn failures_are_collected_and_the_batch_continues() {
    let fx = Fixture::with_entries(&[("bad", true), ("good", true)]).await;
    fx.table.fail_launches_of(&fx.path("bad"));

    let report = fx.supervisor.start_all().await.unwrap().wait().await.unwrap();
    assert_eq!(
        report.outcome(),
        BatchOutcome::PartialFailure {
            failed: 1,
            total: 2
        }
    );
    assert_eq!(report.summary(), "1 of 2 applications failed to start");
    assert_eq!(report.failures[0].path, fx.path("bad"));
    assert_eq!(fx.table.pids_of(&fx.path("good")).len(), 1);
}

#[tokio::test]
async fn empty_registry_is_rejected_before_scanning() {
    let fx = Fixture::with_entries(&[]).await;

    for result in [
        fx.supervisor.start_all().await,
        fx.supervisor.stop_all().await,
        fx.supervisor.restart_all().await,
    ] {
        assert!(matches!(result, Err(SupervisorError::NoEntries { .. })));
    }
    assert_eq!(
        SupervisorError::NoEntries {
            kind: BatchKind::Stop
        }
        .to_string(),
        "There are no applications to stop"
    );
    assert_eq!(fx.table.enumerations(), 0);
}

#[tokio::test]
async fn overlapping_batches_are_rejected() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    let before = fx.table.enumerations();
    fx.table.hold();

    let first = fx.supervisor.start_all().await.unwrap();
    assert!(fx.supervisor.is_batch_running());
    assert!(matches!(
        fx.supervisor.stop_all().await,
        Err(SupervisorError::BatchInProgress)
    ));

    wait_until(|| fx.table.enumerations() > before).await;
    fx.table.release();
    let report = first.wait().await.unwrap();
    assert!(report.is_success());
    assert!(!fx.supervisor.is_batch_running());
    assert!(fx.supervisor.stop_all().await.is_ok());
}

#[tokio::test]
async fn batch_events_bracket_the_work() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    let mut events = fx.supervisor.subscribe();

    let report = fx.supervisor.start_all().await.unwrap().wait().await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        SupervisorEvent::BatchStarted {
            kind: BatchKind::Start
        }
    ));
    match events.recv().await.unwrap() {
        SupervisorEvent::BatchFinished { report: finished } => assert_eq!(finished, report),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn statuses_follow_the_process_table_after_a_batch() {
    let fx = Fixture::with_entries(&[("a", true)]).await;

    assert_eq!(
        fx.supervisor.list_entries().await[0].status(),
        EntryStatus::Stopped
    );
    fx.supervisor.start_all().await.unwrap().wait().await.unwrap();

    // A refresh may be skipped while the post-batch pass is in flight.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            fx.supervisor.refresh_status().await;
            if fx.supervisor.list_entries().await[0].status() == EntryStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status never became Running");
}

#[tokio::test]
async fn add_probes_status_and_starts_disabled() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    let extra = fx.path("extra");
    std::fs::write(&extra, b"").unwrap();
    fx.table.spawn(&extra);

    let entry = fx.supervisor.add_entry(&extra).await.unwrap();
    assert!(!entry.enabled());
    assert_eq!(entry.status(), EntryStatus::Running);
    assert_eq!(fx.supervisor.list_entries().await.len(), 2);
}

#[tokio::test]
async fn add_rejects_missing_files_and_directories() {
    let fx = Fixture::with_entries(&[("a", true)]).await;

    for path in [fx.path("missing"), fx.path("")] {
        assert!(matches!(
            fx.supervisor.add_entry(&path).await,
            Err(SupervisorError::InvalidPath { .. })
        ));
    }
    assert_eq!(fx.supervisor.list_entries().await.len(), 1);
}

#[tokio::test]
async fn remove_out_of_range_changes_nothing() {
    let fx = Fixture::with_entries(&[("a", true), ("b", true)]).await;

    let result = fx.supervisor.remove_entries(&[0, 5]).await;
    assert!(matches!(
        result,
        Err(SupervisorError::Registry(RegistryError::IndexOutOfRange {
            index: 5,
            len: 2
        }))
    ));
    assert_eq!(fx.supervisor.list_entries().await.len(), 2);
}

#[tokio::test]
async fn saving_an_empty_registry_is_refused() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    fx.supervisor.remove_entries(&[0]).await.unwrap();

    assert!(matches!(
        fx.supervisor.save().await,
        Err(SupervisorError::Registry(RegistryError::Empty))
    ));
}

#[tokio::test]
async fn save_round_trips_through_load() {
    let fx = Fixture::with_entries(&[("a", false)]).await;
    fx.supervisor.set_enabled(0, true).await.unwrap();

    let backup = fx.supervisor.save().await.unwrap();
    assert!(backup.is_some());

    assert_eq!(fx.supervisor.load().await.unwrap(), 1);
    assert!(fx.supervisor.list_entries().await[0].enabled());
}

#[tokio::test]
async fn edits_are_rejected_while_a_batch_runs() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    let before = fx.table.enumerations();
    fx.table.hold();

    let batch = fx.supervisor.start_all().await.unwrap();
    wait_until(|| fx.table.enumerations() > before).await;

    assert!(matches!(
        fx.supervisor.remove_entries(&[0]).await,
        Err(SupervisorError::BatchInProgress)
    ));
    assert!(matches!(
        fx.supervisor.set_enabled(0, false).await,
        Err(SupervisorError::BatchInProgress)
    ));

    fx.table.release();
    let report = batch.wait().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(fx.table.launches(), 1);

    // The registry is editable again once the batch is done.
    assert_eq!(fx.supervisor.remove_entries(&[0]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn load_probes_status_of_running_applications() {
    let fx = Fixture::with_entries(&[("a", true), ("b", true)]).await;
    fx.table.spawn(&fx.path("a"));

    assert_eq!(fx.supervisor.load().await.unwrap(), 2);

    let entries = fx.supervisor.list_entries().await;
    assert_eq!(entries[0].status(), EntryStatus::Running);
    assert_eq!(entries[1].status(), EntryStatus::Stopped);
}

#[tokio::test]
async fn removing_the_last_entry_can_be_persisted() {
    let fx = Fixture::with_entries(&[("a", true)]).await;
    fx.supervisor.remove_entries(&[0]).await.unwrap();

    let backup = fx.supervisor.save_allow_empty().await.unwrap();
    assert!(backup.is_some());

    assert_eq!(fx.supervisor.load().await.unwrap(), 0);
    assert!(fx.supervisor.list_entries().await.is_empty());
}

#[tokio::test]
async fn concurrent_saves_each_keep_a_backup() {
    let fx = Fixture::with_entries(&[("a", true)]).await;

    let saves: Vec<_> = (0..8)
        .map(|_| {
            let supervisor = fx.supervisor.clone();
            tokio::spawn(async move { supervisor.save().await })
        })
        .collect();
    for save in saves {
        assert!(save.await.unwrap().unwrap().is_some());
    }

    let backups = std::fs::read_dir(fx.path(""))
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|name| name.ends_with("_apps.toml"))
        .count();
    assert_eq!(backups, 8);
    assert_eq!(fx.supervisor.load().await.unwrap(), 1);
}

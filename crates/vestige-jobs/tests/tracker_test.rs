//! Tracker behaviour over the in-memory job store and a live notification bus.
//!
//! Scenarios:
//! 1. PENDING -> progress(50) -> FAILED(["x"]) -> COMPLETED leaves FAILED
//! 2. Progress never decreases and is clamped
//! 3. Reports after a terminal write are silent no-ops
//! 4. Completion variants set their messages and events
//! 5. Storage failures are swallowed after creation
//! 6. Events reach only the job's owner
//! 7. The retention sweeper removes expired records
//! 8. Racing completions apply once and emit one terminal event

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use vestige_core::{
    EventEnvelope, JobEvent, JobStatus, JobStore, JobType, NotificationBus, Subscription,
};
use vestige_db::MemoryJobStore;
use vestige_jobs::{
    spawn_retention_sweeper, sweep_once, JobLifecycleTracker, SweeperConfig, TrackerConfig,
};

const OWNER: &str = "alice";

fn tracker_with(store: Arc<MemoryJobStore>, bus: &NotificationBus) -> JobLifecycleTracker {
    JobLifecycleTracker::new(store, Arc::new(bus.clone()), TrackerConfig::default())
}

fn drain(sub: &mut Subscription) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    while let Some(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_failed_job_stays_failed() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut sub = bus.subscribe(OWNER);
    let tracker = tracker_with(store.clone(), &bus);

    let job_id = tracker
        .create(OWNER, JobType::Trufor, "TruFor scan", None)
        .await
        .unwrap();
    let pending = store.find(OWNER, job_id).await.unwrap();
    assert_eq!(pending.status, JobStatus::Pending);

    let running = tracker
        .progress(OWNER, job_id, None, Some(50), None)
        .await
        .unwrap();
    assert_eq!(running.status, JobStatus::Processing);
    assert_eq!(running.progress_percent, 50);
    assert!(running.started_at.is_some());

    let failed = tracker
        .complete(OWNER, job_id, JobStatus::Failed, None, vec!["x".to_string()])
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.message, "Failed");

    assert!(tracker
        .complete(OWNER, job_id, JobStatus::Completed, None, vec![])
        .await
        .is_none());

    let stored = store.find(OWNER, job_id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.errors, vec!["x".to_string()]);
    assert!(stored.completed_at.is_some());

    let kinds: Vec<String> = drain(&mut sub).into_iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec!["job_started", "job_progress", "job_failed"]);
}

#[tokio::test]
async fn test_failed_event_carries_first_error() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut sub = bus.subscribe(OWNER);
    let tracker = tracker_with(store, &bus);

    let job_id = tracker
        .create(OWNER, JobType::PanelExtraction, "Panels", None)
        .await
        .unwrap();
    tracker
        .complete(
            OWNER,
            job_id,
            JobStatus::Partial,
            Some(serde_json::json!({"panels": 3})),
            vec!["panel 2 unreadable".to_string(), "panel 4 unreadable".to_string()],
        )
        .await
        .unwrap();

    let last = drain(&mut sub).pop().unwrap();
    assert_eq!(
        last.payload,
        JobEvent::JobFailed {
            job_id,
            status: JobStatus::Partial,
            error: Some("panel 2 unreadable".to_string()),
        }
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_clamped() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = tracker_with(store, &bus);
    let job_id = tracker
        .create(OWNER, JobType::CopyMoveSingle, "Copy-move", None)
        .await
        .unwrap();

    let first = tracker.progress(OWNER, job_id, None, Some(70), None).await.unwrap();
    let started_at = first.started_at;
    let lower = tracker.progress(OWNER, job_id, None, Some(30), None).await.unwrap();
    assert_eq!(lower.progress_percent, 70);
    assert_eq!(lower.started_at, started_at);

    let over = tracker.progress(OWNER, job_id, None, Some(250), None).await.unwrap();
    assert_eq!(over.progress_percent, 100);
    assert_eq!(over.status, JobStatus::Processing);
}

#[tokio::test]
async fn test_progress_rejects_terminal_status() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = tracker_with(store.clone(), &bus);
    let job_id = tracker
        .create(OWNER, JobType::Provenance, "Provenance", None)
        .await
        .unwrap();

    assert!(tracker
        .progress(OWNER, job_id, Some(JobStatus::Completed), Some(100), None)
        .await
        .is_none());
    assert_eq!(
        store.find(OWNER, job_id).await.unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn test_reports_after_terminal_are_silent() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut sub = bus.subscribe(OWNER);
    let tracker = tracker_with(store.clone(), &bus);
    let job_id = tracker
        .create(OWNER, JobType::CbirSearch, "Search", None)
        .await
        .unwrap();
    tracker
        .complete(OWNER, job_id, JobStatus::Completed, None, vec![])
        .await
        .unwrap();
    drain(&mut sub);

    assert!(tracker
        .progress(OWNER, job_id, None, Some(10), Some("late".to_string()))
        .await
        .is_none());
    assert!(drain(&mut sub).is_empty());

    let stored = store.find(OWNER, job_id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress_percent, 100);
    assert_eq!(stored.message, "Completed");
}

#[tokio::test]
async fn test_completed_clears_errors() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = tracker_with(store, &bus);
    let job_id = tracker
        .create(OWNER, JobType::WatermarkRemoval, "Watermark", None)
        .await
        .unwrap();

    let done = tracker
        .complete(
            OWNER,
            job_id,
            JobStatus::Completed,
            Some(serde_json::json!({"output": "clean.png"})),
            vec!["ignored".to_string()],
        )
        .await
        .unwrap();
    assert!(done.errors.is_empty());
    assert_eq!(done.progress_percent, 100);
    assert_eq!(done.output_data, Some(serde_json::json!({"output": "clean.png"})));
}

#[tokio::test]
async fn test_complete_rejects_non_terminal_status() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = tracker_with(store, &bus);
    let job_id = tracker
        .create(OWNER, JobType::Trufor, "TruFor", None)
        .await
        .unwrap();

    assert!(tracker
        .complete(OWNER, job_id, JobStatus::Processing, None, vec![])
        .await
        .is_none());
}

#[tokio::test]
async fn test_storage_failure_is_swallowed_after_create() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = tracker_with(store.clone(), &bus);
    let job_id = tracker
        .create(OWNER, JobType::Trufor, "TruFor", None)
        .await
        .unwrap();

    store.set_unavailable(true);
    assert!(tracker.progress(OWNER, job_id, None, Some(5), None).await.is_none());
    assert!(tracker
        .complete(OWNER, job_id, JobStatus::Failed, None, vec![])
        .await
        .is_none());
    assert!(tracker
        .create(OWNER, JobType::Trufor, "TruFor", None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_unknown_job_reports_are_ignored() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut sub = bus.subscribe(OWNER);
    let tracker = tracker_with(store, &bus);

    assert!(tracker
        .progress(OWNER, vestige_core::new_v7(), None, Some(5), None)
        .await
        .is_none());
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test]
async fn test_events_reach_only_owner() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut alice = bus.subscribe("alice");
    let mut bob = bus.subscribe("bob");
    let tracker = tracker_with(store, &bus);

    tracker
        .create("alice", JobType::CbirIndex, "Index", None)
        .await
        .unwrap();

    assert_eq!(drain(&mut alice).len(), 1);
    assert!(drain(&mut bob).is_empty());
}

#[tokio::test]
async fn test_sweep_once_purges_expired() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let short = JobLifecycleTracker::new(
        store.clone(),
        Arc::new(bus.clone()),
        TrackerConfig::default().with_retention(Duration::zero()),
    );
    let long = tracker_with(store.clone(), &bus);

    short
        .create(OWNER, JobType::Trufor, "gone", None)
        .await
        .unwrap();
    let kept = long
        .create(OWNER, JobType::Trufor, "kept", None)
        .await
        .unwrap();

    assert_eq!(sweep_once(store.as_ref()).await, Some(1));
    assert_eq!(store.len().await, 1);
    assert!(store.find(OWNER, kept).await.is_ok());

    store.set_unavailable(true);
    assert_eq!(sweep_once(store.as_ref()).await, None);
}

#[tokio::test]
async fn test_spawned_sweeper_runs_and_stops() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let tracker = JobLifecycleTracker::new(
        store.clone(),
        Arc::new(bus.clone()),
        TrackerConfig::default().with_retention(Duration::zero()),
    );
    tracker
        .create(OWNER, JobType::Trufor, "gone", None)
        .await
        .unwrap();

    let handle = spawn_retention_sweeper(
        store.clone(),
        SweeperConfig::default().with_interval(StdDuration::from_millis(10)),
    );
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(store.is_empty().await);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_completions_apply_once() {
    let store = Arc::new(MemoryJobStore::new());
    let bus = NotificationBus::default();
    let mut sub = bus.subscribe(OWNER);
    let tracker = tracker_with(store.clone(), &bus);

    let job_id = tracker
        .create(OWNER, JobType::Trufor, "TruFor scan", None)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let tracker = tracker.clone();
        let (status, errors) = if i % 2 == 0 {
            (JobStatus::Completed, Vec::new())
        } else {
            (JobStatus::Failed, vec!["x".to_string()])
        };
        tasks.push(tokio::spawn(async move {
            tracker.complete(OWNER, job_id, status, None, errors).await
        }));
    }

    let mut applied = Vec::new();
    for task in tasks {
        if let Some(job) = task.await.unwrap() {
            applied.push(job);
        }
    }
    assert_eq!(applied.len(), 1);
    let winner = applied[0].status;

    let stored = store.find(OWNER, job_id).await.unwrap();
    assert_eq!(stored.status, winner);

    let terminal: Vec<_> = drain(&mut sub)
        .into_iter()
        .filter(|e| matches!(e.event_type.as_str(), "job_completed" | "job_failed"))
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].payload.job_id(), job_id);
    assert_eq!(terminal[0].payload.status(), winner);
}

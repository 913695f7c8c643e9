//! Integration tests for the push phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidesync_engine::{SyncConfig, SyncEvent, MSG_CANCELLED, PERMANENT_PREFIX};
use tidesync_protocol::{Operation, RecordStatus, SyncStatus};
use tidesync_testkit::prelude::*;

#[tokio::test]
async fn create_then_update_reach_remote_in_order() {
    let harness = TestEngine::new();
    let first = harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));
    let second = harness.enqueue("student", "s1", Operation::Update, Some(json!({"name": "B"})));

    let result = harness.engine.push_pending().await;

    assert!(result.success);
    assert_eq!(result.synced_count, 2);
    assert_eq!(
        harness.calls.described(),
        vec![r#"create s1 {"name":"A"}"#, r#"update s1 {"name":"B"}"#]
    );
    let log = harness.engine.log();
    assert_eq!(log.get(first).unwrap().status, RecordStatus::Synced);
    assert_eq!(log.get(second).unwrap().status, RecordStatus::Synced);
}

#[tokio::test]
async fn second_of_three_fails() {
    let harness = TestEngine::with_adapters(SyncConfig::default(), &["student"], |adapter| {
        adapter.failing(ScriptedFailures::none().fail_call(2))
    });
    harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));
    let failing = harness.enqueue("student", "s2", Operation::Create, Some(json!({"name": "B"})));
    harness.enqueue("student", "s3", Operation::Create, Some(json!({"name": "C"})));

    let result = harness.engine.push_pending().await;

    assert!(!result.success);
    assert_eq!(result.synced_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(harness.calls.len(), 3);

    let record = harness.engine.log().get(failing).unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert!(!record.last_error.unwrap().is_empty());
}

#[tokio::test]
async fn one_bad_record_does_not_block_others() {
    let harness = TestEngine::new();
    harness.adapter("grade").set_failures(ScriptedFailures::none().fail_entity("g2"));
    for (kind, id) in [("grade", "g1"), ("grade", "g2"), ("class", "c1"), ("student", "s1")] {
        harness.enqueue(kind, id, Operation::Delete, None);
    }

    let result = harness.engine.push_pending().await;

    assert_eq!(result.failed_count, 1);
    assert_eq!(result.synced_count, 3);
    assert_eq!(
        harness.calls.described(),
        vec!["delete g1", "delete g2", "delete c1", "delete s1"]
    );
}

#[tokio::test]
async fn failed_record_is_retried_once_then_retired() {
    let harness = TestEngine::new();
    harness.adapter("student").set_failures(ScriptedFailures::none().fail_all());
    let id = harness.enqueue("student", "s1", Operation::Update, Some(json!({"name": "A"})));

    let first = harness.engine.push_pending().await;
    assert_eq!(first.failed_count, 1);
    assert_eq!(harness.engine.log().pending_count(), 1);

    harness.adapter("student").set_failures(ScriptedFailures::none());
    let second = harness.engine.push_pending().await;
    assert!(second.success);
    assert_eq!(second.synced_count, 1);
    assert_eq!(harness.engine.log().get(id).unwrap().status, RecordStatus::Synced);
    assert!(harness.engine.log().get(id).unwrap().last_error.is_none());

    harness.calls.clear();
    let third = harness.engine.push_pending().await;
    assert!(third.success);
    assert_eq!(third.synced_count, 0);
    assert!(harness.calls.is_empty());
}

#[tokio::test]
async fn offline_issues_no_calls() {
    let harness = TestEngine::new();
    harness.enqueue("student", "s1", Operation::Delete, None);
    harness.probe.set_online(false);
    let events = harness.engine.notifier().subscribe();

    let result = harness.engine.push_pending().await;

    assert!(!result.success);
    assert_eq!(result.message, "offline");
    assert!(harness.calls.is_empty());
    assert_eq!(harness.engine.log().pending_count(), 1);
    assert!(events.try_recv().is_err());
    assert!(!harness.engine.is_syncing());
}

#[tokio::test(start_paused = true)]
async fn concurrent_pushes_dispatch_once() {
    let harness = TestEngine::with_adapters(SyncConfig::default(), &["student"], |adapter| {
        adapter.with_delay(Duration::from_millis(100))
    });
    harness.enqueue("student", "s1", Operation::Delete, None);
    harness.enqueue("student", "s2", Operation::Delete, None);

    let (a, b) = tokio::join!(harness.engine.push_pending(), harness.engine.push_pending());

    let (ran, rejected) = if a.is_already_running() { (b, a) } else { (a, b) };
    assert!(ran.success);
    assert_eq!(ran.synced_count, 2);
    assert!(!rejected.success);
    assert_eq!(rejected.message, "already running");
    assert_eq!(harness.calls.described(), vec!["delete s1", "delete s2"]);
}

#[tokio::test(start_paused = true)]
async fn pull_is_rejected_while_push_runs() {
    let harness = TestEngine::with_adapters(SyncConfig::default(), &["student"], |adapter| {
        adapter.with_delay(Duration::from_secs(1))
    });
    harness.enqueue("student", "s1", Operation::Delete, None);

    let (push, pull) = tokio::join!(harness.engine.push_pending(), harness.engine.pull_all());

    assert!(push.success);
    assert!(pull.is_already_running());
}

#[tokio::test]
async fn unknown_kind_fails_only_its_record() {
    let harness = TestEngine::new();
    let orphan = harness.enqueue("course", "k1", Operation::Delete, None);
    harness.enqueue("student", "s1", Operation::Delete, None);

    let result = harness.engine.push_pending().await;

    assert_eq!(result.failed_count, 1);
    assert_eq!(result.synced_count, 1);
    let record = harness.engine.log().get(orphan).unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(
        record.last_error.as_deref(),
        Some("permanent: unknown entity kind: course")
    );
    assert!(record.last_error.unwrap().starts_with(PERMANENT_PREFIX));
}

#[tokio::test]
async fn storage_failure_aborts_the_run() {
    let harness = TestEngine::new();
    harness.enqueue("student", "s1", Operation::Delete, None);
    harness.enqueue("student", "s2", Operation::Delete, None);
    let events = harness.engine.notifier().subscribe();
    harness.faults.fail_writes();

    let result = harness.engine.push_pending().await;

    assert!(!result.success);
    assert!(result.message.contains("injected"), "{}", result.message);
    assert_eq!(result.synced_count, 0);
    assert_eq!(harness.calls.described(), vec!["delete s1"]);
    let statuses: Vec<SyncEvent> = events
        .try_iter()
        .filter(|e| matches!(e, SyncEvent::Status(_)))
        .collect();
    assert_eq!(
        statuses,
        vec![
            SyncEvent::Status(SyncStatus::Syncing),
            SyncEvent::Status(SyncStatus::Failed),
            SyncEvent::Status(SyncStatus::Idle),
        ]
    );

    // The first record was accepted remotely but never marked; it is resent.
    harness.faults.heal();
    harness.calls.clear();
    let retry = harness.engine.push_pending().await;
    assert!(retry.success);
    assert_eq!(harness.calls.described(), vec!["delete s1", "delete s2"]);
}

#[tokio::test]
async fn progress_is_reported_per_record() {
    let harness = TestEngine::new();
    for id in ["s1", "s2", "s3", "s4"] {
        harness.enqueue("student", id, Operation::Delete, None);
    }
    let events = harness.engine.notifier().subscribe();

    harness.engine.push_pending().await;

    let progress: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            SyncEvent::Progress(p) => Some(p),
            SyncEvent::Status(_) => None,
        })
        .collect();
    assert_eq!(progress, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_between_records() {
    let harness = TestEngine::with_adapters(SyncConfig::default(), &["student"], |adapter| {
        adapter.with_delay(Duration::from_secs(10))
    });
    for id in ["s1", "s2", "s3"] {
        harness.enqueue("student", id, Operation::Delete, None);
    }

    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.push_pending().await });
    tokio::time::sleep(Duration::from_secs(15)).await;
    harness.engine.cancel();
    let result = run.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.message, MSG_CANCELLED);
    assert_eq!(result.synced_count, 2);
    assert_eq!(harness.engine.log().pending_count(), 1);
    assert_eq!(harness.engine.last_result(), Some(result));
}

#[tokio::test]
async fn enqueue_during_push_is_picked_up_next_run() {
    let harness = TestEngine::new();
    harness.enqueue("student", "s1", Operation::Delete, None);

    let log = Arc::clone(harness.engine.log());
    let fired = AtomicBool::new(false);
    harness.engine.notifier().subscribe_progress(move |p| {
        if p >= 1.0 && !fired.swap(true, Ordering::SeqCst) {
            log.enqueue("student".into(), "late", Operation::Delete, None)
                .unwrap();
        }
    });

    let first = harness.engine.push_pending().await;
    assert_eq!(first.synced_count, 1);
    assert_eq!(harness.engine.log().pending_count(), 1);

    let second = harness.engine.push_pending().await;
    assert_eq!(second.synced_count, 1);
    assert_eq!(harness.calls.described(), vec!["delete s1", "delete late"]);
}

#[tokio::test]
async fn collapsed_edits_send_one_call() {
    let harness = TestEngine::with_config(
        SyncConfig::default(),
        LogConfig::new().with_enqueue_policy(EnqueuePolicy::CollapseByEntity),
    );
    harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));
    harness.enqueue("student", "s1", Operation::Update, Some(json!({"name": "B"})));
    harness.enqueue("class", "c1", Operation::Create, Some(json!({})));
    harness.enqueue("class", "c1", Operation::Delete, None);

    let result = harness.engine.push_pending().await;

    assert!(result.success);
    assert_eq!(harness.calls.described(), vec![r#"create s1 {"name":"B"}"#]);
}

fn collapsing_with_slow_students() -> TestEngine {
    TestEngine::build(
        SyncConfig::default(),
        LogConfig::new().with_enqueue_policy(EnqueuePolicy::CollapseByEntity),
        &["student"],
        |adapter| adapter.with_delay(Duration::from_secs(1)),
    )
}

#[tokio::test(start_paused = true)]
async fn delete_during_push_is_not_collapsed_into_the_sent_create() {
    let harness = collapsing_with_slow_students();
    harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));

    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.push_pending().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.enqueue("student", "s1", Operation::Delete, None);
    let first = run.await.unwrap();
    assert_eq!(first.synced_count, 1);
    assert_eq!(harness.engine.log().pending_count(), 1);

    let second = harness.engine.push_pending().await;
    assert_eq!(second.synced_count, 1);
    assert_eq!(
        harness.calls.described(),
        vec![r#"create s1 {"name":"A"}"#, "delete s1"]
    );
}

#[tokio::test(start_paused = true)]
async fn update_during_push_is_sent_as_update() {
    let harness = collapsing_with_slow_students();
    harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));
    harness.enqueue("student", "s2", Operation::Create, Some(json!({"name": "B"})));

    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.push_pending().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    // s2 is still waiting its turn in the run's snapshot.
    harness.enqueue("student", "s2", Operation::Update, Some(json!({"name": "C"})));
    run.await.unwrap();
    harness.engine.push_pending().await;

    assert_eq!(
        harness.calls.described(),
        vec![
            r#"create s1 {"name":"A"}"#,
            r#"create s2 {"name":"B"}"#,
            r#"update s2 {"name":"C"}"#,
        ]
    );
    assert_eq!(harness.engine.log().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_releases_its_records() {
    let harness = collapsing_with_slow_students();
    for id in ["s1", "s2"] {
        harness.enqueue("student", id, Operation::Create, Some(json!({})));
    }

    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.push_pending().await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.engine.cancel();
    assert_eq!(run.await.unwrap().message, MSG_CANCELLED);

    // s2 was never sent, so a delete cancels it outright.
    harness.enqueue("student", "s2", Operation::Delete, None);
    assert_eq!(harness.engine.log().pending_count(), 0);
}

mod fifo {
    use super::*;
    use proptest::prelude::*;
    use tidesync_testkit::CallKind;

    fn call_kind(operation: Operation) -> CallKind {
        match operation {
            Operation::Create => CallKind::Create,
            Operation::Update => CallKind::Update,
            Operation::Delete => CallKind::Delete,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn adapter_calls_follow_enqueue_order(mutations in mutations_strategy(30)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let harness = TestEngine::new();
            for m in &mutations {
                harness.enqueue(&m.kind, &m.entity_id, m.operation, m.payload.clone());
            }

            let result = runtime.block_on(harness.engine.push_pending());
            prop_assert!(result.success);

            let observed: Vec<_> = harness
                .calls
                .writes()
                .into_iter()
                .map(|c| (c.entity_kind.as_str().to_string(), c.entity_id, c.call, c.payload))
                .collect();
            let expected: Vec<_> = mutations
                .into_iter()
                .map(|m| (m.kind, m.entity_id, call_kind(m.operation), m.payload))
                .collect();
            prop_assert_eq!(observed, expected);
        }
    }
}

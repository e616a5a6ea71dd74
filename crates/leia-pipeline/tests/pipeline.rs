//! End-to-end behavior of a running pipeline against scripted transports.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use leia_core::{BackoffPolicy, EventRecord, EventType, TelemetryError};
use leia_pipeline::testing::{ScriptedResponse, ScriptedTransport};
use leia_pipeline::{DurableQueue, EngineState, FlushOutcome, OverflowPolicy, Pipeline, PipelineConfig};
use leia_store::{KeyValueStore, MemoryStore, SqliteStore, keys};
use serde_json::json;
use tokio::time::{Instant, sleep};

const INTERVAL: Duration = Duration::from_secs(60);

fn config() -> PipelineConfig {
    PipelineConfig {
        sync_interval: INTERVAL,
        flush_threshold: 10,
        max_queue_len: 100,
        shutdown_timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            jitter_factor: 0.0,
        },
        ..PipelineConfig::default()
    }
}

fn names(records: &[EventRecord]) -> Vec<String> {
    records.iter().map(|r| r.event_type().to_string()).collect()
}

fn persisted_names(store: &MemoryStore) -> Option<Vec<String>> {
    let image = store.peek(keys::PENDING_EVENTS)?;
    Some(
        image
            .as_array()?
            .iter()
            .filter_map(|r| r["event_type"].as_str().map(String::from))
            .collect(),
    )
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

#[tokio::test(start_paused = true)]
async fn timer_tick_flushes_small_queue() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    let tracker = pipeline.tracker();

    for name in ["A", "B", "C"] {
        tracker.track(name, json!({}));
    }
    sleep(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(transport.call_count(), 0);

    sleep(Duration::from_secs(2)).await;
    transport.wait_for_calls(1).await;
    eventually("queue drained", || pipeline.reader().is_empty()).await;

    assert_eq!(names(&transport.calls()[0]), ["A", "B", "C"]);
    eventually("empty image persisted", || persisted_names(&store) == Some(vec![])).await;
    assert_eq!(pipeline.state(), EngineState::Idle);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn threshold_flushes_before_timer() {
    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), Arc::new(MemoryStore::new()), transport.clone())
        .await
        .unwrap();
    let tracker = pipeline.tracker();

    let start = Instant::now();
    for i in 0..10 {
        tracker.track(format!("E{i}"), json!({ "i": i }));
    }
    transport.wait_for_calls(1).await;
    assert!(start.elapsed() < INTERVAL);
    eventually("queue drained", || pipeline.reader().is_empty()).await;
    assert_eq!(transport.calls()[0].len(), 10);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_flush_keeps_queue_until_next_tick() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::with_script([ScriptedResponse::status(500, "boom")]));
    let pipeline = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    let tracker = pipeline.tracker();

    tracker.track("A", json!({"n": 1}));
    let before = pipeline.reader().snapshot();
    let outcome = pipeline.flush_now().await.unwrap();
    assert_matches!(outcome, FlushOutcome::Failed { error: TelemetryError::Server { status: 500, .. } });
    assert_eq!(pipeline.reader().snapshot(), before);
    assert_matches!(pipeline.state(), EngineState::Backoff { failures: 1, .. });

    sleep(INTERVAL + Duration::from_secs(1)).await;
    transport.wait_for_calls(2).await;
    eventually("queue drained", || pipeline.reader().is_empty()).await;
    assert_eq!(names(&transport.calls()[1]), ["A"]);

    let stats = pipeline.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.delivered_events, 1);
    assert_eq!(stats.consecutive_failures, 0);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn priority_event_flushes_everything_queued() {
    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), Arc::new(MemoryStore::new()), transport.clone())
        .await
        .unwrap();
    let tracker = pipeline.tracker();

    for name in ["A", "B", "C"] {
        tracker.track(name, json!({}));
    }
    tracker.track(EventType::UserLogin, json!({"user_email": "ana@uni.edu"}));

    transport.wait_for_calls(1).await;
    assert_eq!(names(&transport.calls()[0]), ["A", "B", "C", "USER_LOGIN"]);
    let _ = pipeline.shutdown().await;
}

#[tokio::test]
async fn restart_resends_persisted_events_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let transport = Arc::new(ScriptedTransport::with_script([ScriptedResponse::offline()]));
        let pipeline = Pipeline::start(config(), store, transport).await.unwrap();
        let tracker = pipeline.tracker();
        tracker.track("FIRST", json!({"n": 1}));
        tracker.track("SECOND", json!({"n": 2}));
        assert!(pipeline.shutdown().await.is_failed());
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let loaded = DurableQueue::load_all(store.as_ref()).await.unwrap();
    assert_eq!(names(&loaded), ["FIRST", "SECOND"]);

    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    assert_eq!(pipeline.reader().len(), 2);
    let outcome = pipeline.flush_now().await.unwrap();
    assert_matches!(outcome, FlushOutcome::Delivered { count: 2 });
    assert_eq!(transport.calls()[0], loaded);
    assert_eq!(store.get(keys::PENDING_EVENTS).await.unwrap(), Some(json!([])));
    let _ = pipeline.shutdown().await;
}

#[tokio::test]
async fn torn_queue_image_does_not_block_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.db");
    drop(SqliteStore::open(&path).unwrap());
    let conn = rusqlite::Connection::open(&path).unwrap();
    let _ = conn
        .execute(
            "INSERT OR REPLACE INTO entries (key, json, written_at) VALUES (?1, ?2, '')",
            (keys::PENDING_EVENTS, r#"[{"event_type":"#),
        )
        .unwrap();
    drop(conn);

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    assert!(pipeline.reader().is_empty());
    assert_matches!(pipeline.flush_now().await.unwrap(), FlushOutcome::Empty);
    assert_eq!(store.get(keys::PENDING_EVENTS).await.unwrap(), Some(json!([])));

    pipeline.tracker().track("AFTER", json!({}));
    assert_matches!(pipeline.flush_now().await.unwrap(), FlushOutcome::Delivered { count: 1 });
    assert_eq!(transport.call_count(), 1);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn one_flight_at_a_time() {
    let transport = Arc::new(ScriptedTransport::new().gated());
    let pipeline = Pipeline::start(config(), Arc::new(MemoryStore::new()), transport.clone())
        .await
        .unwrap();
    let tracker = pipeline.tracker();

    for i in 0..10 {
        tracker.track(format!("E{i}"), json!({}));
    }
    transport.wait_for_calls(1).await;
    assert_eq!(pipeline.state(), EngineState::Flushing);

    for i in 10..25 {
        tracker.track(format!("E{i}"), json!({}));
        assert!(tracker.request_flush());
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.call_count(), 1);

    transport.release(100);
    eventually("engine idle", || pipeline.state() == EngineState::Idle).await;
    assert_eq!(transport.max_in_flight(), 1);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(pipeline.reader().len(), 15, "records appended in transit stay queued");
    let first = &pipeline.reader().snapshot()[0];
    assert_eq!(first.event_type().as_str(), "E10");
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn triggers_during_backoff_wait_for_expiry() {
    let transport = Arc::new(ScriptedTransport::with_script([ScriptedResponse::offline()]));
    let pipeline = Pipeline::start(config(), Arc::new(MemoryStore::new()), transport.clone())
        .await
        .unwrap();
    let tracker = pipeline.tracker();

    tracker.track("A", json!({}));
    assert!(pipeline.flush_now().await.unwrap().is_failed());
    for i in 0..12 {
        tracker.track(format!("E{i}"), json!({}));
    }
    sleep(Duration::from_millis(900)).await;
    assert_eq!(transport.call_count(), 1);

    sleep(Duration::from_millis(200)).await;
    transport.wait_for_calls(2).await;
    eventually("queue drained", || pipeline.reader().is_empty()).await;
    assert_eq!(transport.calls()[1].len(), 13);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_keeps_events_in_memory() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::start(config(), store.clone(), Arc::new(ScriptedTransport::new()))
        .await
        .unwrap();
    let tracker = pipeline.tracker();

    store.set_fail_writes(true);
    tracker.track("A", json!({}));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.reader().len(), 1);
    assert_eq!(persisted_names(&store), None);

    store.set_fail_writes(false);
    tracker.track("B", json!({}));
    eventually("image persisted", || {
        persisted_names(&store) == Some(vec!["A".to_string(), "B".to_string()])
    })
    .await;
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_makes_final_flush() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::new());
    let pipeline = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    let tracker = pipeline.tracker();
    tracker.track(EventType::ExtensionDeactivated, json!({}));

    let outcome = pipeline.shutdown().await;
    assert_matches!(outcome, FlushOutcome::Delivered { count: 1 });
    assert_eq!(persisted_names(&store), Some(vec![]));
    assert!(!tracker.request_flush(), "engine is gone after shutdown");
}

#[tokio::test(start_paused = true)]
async fn shutdown_persists_when_final_flush_fails() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::with_script([ScriptedResponse::offline()]));
    let pipeline = Pipeline::start(config(), store.clone(), transport).await.unwrap();
    let tracker = pipeline.tracker();
    tracker.track("A", json!({}));
    tracker.track("B", json!({}));

    let outcome = pipeline.shutdown().await;
    assert_matches!(outcome, FlushOutcome::Failed { error: TelemetryError::Network(_) });
    assert_eq!(persisted_names(&store), Some(vec!["A".to_string(), "B".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn overflow_drops_oldest() {
    let config = PipelineConfig {
        max_queue_len: 3,
        overflow_policy: OverflowPolicy::DropOldest,
        ..config()
    };
    let pipeline = Pipeline::start(config, Arc::new(MemoryStore::new()), Arc::new(ScriptedTransport::new()))
        .await
        .unwrap();
    let tracker = pipeline.tracker();
    for name in ["A", "B", "C", "D", "E"] {
        tracker.track(name, json!({}));
    }
    assert_eq!(names(&pipeline.reader().snapshot()), ["C", "D", "E"]);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clear_empties_memory_and_storage() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::start(config(), store.clone(), Arc::new(ScriptedTransport::new()))
        .await
        .unwrap();
    let tracker = pipeline.tracker();
    tracker.track("A", json!({}));
    tracker.track("B", json!({}));

    assert_eq!(pipeline.clear().await.unwrap(), 2);
    assert!(pipeline.reader().is_empty());
    assert_eq!(persisted_names(&store), Some(vec![]));
    assert_matches!(pipeline.flush_now().await.unwrap(), FlushOutcome::Empty);
    let _ = pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_survives_restart() {
    let store = Arc::new(MemoryStore::new());
    let first = Pipeline::start(config(), store.clone(), Arc::new(ScriptedTransport::new()))
        .await
        .unwrap();
    let session = first.tracker().login("ana@uni.edu").await;
    let _ = first.shutdown().await;

    let transport = Arc::new(ScriptedTransport::new());
    let second = Pipeline::start(config(), store.clone(), transport.clone()).await.unwrap();
    assert_eq!(second.sessions().current_session_id(), Some(session.id.clone()));

    let tracker = second.tracker();
    tracker.track_chat_interaction("user_query", "explica los lifetimes", false);
    let record = &second.reader().snapshot()[0];
    assert_eq!(record.session_id(), &session.id);
    assert_eq!(record.identity().as_str(), "ana@uni.edu");
    assert_eq!(record.data()["query_category"], "CONCEPT_EXPLANATION");

    tracker.logout().await;
    assert_eq!(store.peek(keys::CURRENT_SESSION_ID), None);
    assert_eq!(store.peek(keys::AUTHENTICATED_EMAIL), None);
    let _ = second.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_observable() {
    let transport = Arc::new(ScriptedTransport::new().gated());
    let pipeline = Pipeline::start(config(), Arc::new(MemoryStore::new()), transport.clone())
        .await
        .unwrap();
    let mut states = pipeline.watch_state();
    pipeline.tracker().track(EventType::UserLogin, json!({}));

    states.wait_for(|s| *s == EngineState::Flushing).await.unwrap();
    transport.release(1);
    states.wait_for(|s| *s == EngineState::Idle).await.unwrap();
    assert_eq!(pipeline.stats().delivered_batches, 1);
    let _ = pipeline.shutdown().await;
}

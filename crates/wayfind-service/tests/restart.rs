//! Trigger resolution across a process restart, against a real SQLite file.
//!
//! Run with: `cargo test --package wayfind-service --test restart`

use std::sync::Arc;

use tokio::sync::Barrier;

use wayfind_core::mock::{MockPlaceQueryClient, RecordingMonitor, RecordingSink};
use wayfind_core::{DiscoveryEngine, EffectDispatcher, EngineConfig, LocationOutcome, TriggerOutcome};
use wayfind_service::backend::shared;
use wayfind_service::SqliteBackend;
use wayfind_store::Store;
use wayfind_types::{LocationSample, PlaceCandidate};

fn engine_over(
    db: &std::path::Path,
    client: Arc<MockPlaceQueryClient>,
    monitor: Arc<RecordingMonitor>,
    sink: Arc<RecordingSink>,
) -> DiscoveryEngine {
    let backend = Arc::new(SqliteBackend::new(shared(Store::open(db).unwrap())));
    DiscoveryEngine::new(
        EngineConfig::default(),
        client,
        backend.clone(),
        backend,
        monitor,
    )
    .unwrap()
    .with_effects(EffectDispatcher::new().with_sink(sink))
}

#[tokio::test]
async fn fire_after_restart_resolves_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("discoveries.db");

    let client = Arc::new(MockPlaceQueryClient::new());
    client.set_places(vec![
        PlaceCandidate::new("101", "Springfield", 40.01, -74.01, "town"),
        PlaceCandidate::new("202", "Shelbyville", 40.05, -74.05, "city"),
    ]);

    {
        let first = engine_over(
            &db,
            client.clone(),
            Arc::new(RecordingMonitor::new()),
            Arc::new(RecordingSink::new("notification")),
        );
        let outcome = first
            .on_location_update(&LocationSample::now(40.0, -74.0))
            .await
            .unwrap();
        assert!(matches!(outcome, LocationOutcome::Armed(ref r) if r.len() == 2));
    }

    // New process: nothing fetched, fresh monitor, same database file.
    let monitor = Arc::new(RecordingMonitor::new());
    let sink = Arc::new(RecordingSink::new("notification"));
    let restarted = engine_over(&db, client.clone(), monitor.clone(), sink.clone());

    assert_eq!(restarted.registry().rearm_all().await.unwrap(), 2);
    assert!(monitor.is_active("101"));
    assert!(monitor.is_active("202"));

    let outcome = restarted.on_trigger_fired("202").await.unwrap();
    let TriggerOutcome::Discovered(record) = outcome else {
        panic!("expected discovery, got {outcome:?}");
    };
    assert_eq!(record.name, "Shelbyville");
    assert_eq!(record.category, "city");
    assert_eq!(record.latitude, 40.05);

    restarted.effects().drain().await;
    assert_eq!(sink.calls(), vec!["Shelbyville".to_string()]);
    assert_eq!(client.fetch_count(), 1);
}

#[tokio::test]
async fn discovery_survives_restart_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("discoveries.db");

    let client = Arc::new(MockPlaceQueryClient::new());
    client.set_places(vec![PlaceCandidate::new(
        "101",
        "Springfield",
        40.01,
        -74.01,
        "town",
    )]);

    let first_sink = Arc::new(RecordingSink::new("sound"));
    {
        let first = engine_over(
            &db,
            client.clone(),
            Arc::new(RecordingMonitor::new()),
            first_sink.clone(),
        );
        first
            .on_location_update(&LocationSample::now(40.0, -74.0))
            .await
            .unwrap();
        first.on_trigger_fired("101").await.unwrap();
        first.effects().drain().await;
    }

    // A delayed duplicate delivered to the next process.
    let second_sink = Arc::new(RecordingSink::new("sound"));
    let restarted = engine_over(
        &db,
        client,
        Arc::new(RecordingMonitor::new()),
        second_sink.clone(),
    );
    let outcome = restarted.on_trigger_fired("101").await.unwrap();
    assert_eq!(outcome, TriggerOutcome::AlreadyDiscovered);

    restarted.effects().drain().await;
    assert_eq!(first_sink.calls().len(), 1);
    assert!(second_sink.calls().is_empty());

    let store = Store::open(&db).unwrap();
    assert_eq!(store.count_discoveries().unwrap(), 1);
    assert_eq!(store.get_discovery("101").unwrap().unwrap().name, "Springfield");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_fires_across_processes_discover_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("discoveries.db");

    let client = Arc::new(MockPlaceQueryClient::new());
    client.set_places(vec![PlaceCandidate::new(
        "101",
        "Springfield",
        40.01,
        -74.01,
        "town",
    )]);

    let sink = Arc::new(RecordingSink::new("notification"));
    let engines = [
        Arc::new(engine_over(
            &db,
            client.clone(),
            Arc::new(RecordingMonitor::new()),
            sink.clone(),
        )),
        Arc::new(engine_over(
            &db,
            client.clone(),
            Arc::new(RecordingMonitor::new()),
            sink.clone(),
        )),
    ];
    engines[0]
        .on_location_update(&LocationSample::now(40.0, -74.0))
        .await
        .unwrap();

    const FIRES: usize = 8;
    let barrier = Arc::new(Barrier::new(FIRES));
    let handles: Vec<_> = (0..FIRES)
        .map(|i| {
            let engine = Arc::clone(&engines[i % engines.len()]);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                engine.on_trigger_fired("101").await.unwrap()
            })
        })
        .collect();

    let mut discovered = 0;
    for handle in handles {
        if let TriggerOutcome::Discovered(_) = handle.await.unwrap() {
            discovered += 1;
        }
    }

    for engine in &engines {
        engine.effects().drain().await;
    }
    assert_eq!(discovered, 1);
    assert_eq!(sink.calls(), vec!["Springfield".to_string()]);
    assert_eq!(Store::open(&db).unwrap().count_discoveries().unwrap(), 1);
}

//! Newline-delimited JSON event feed.
//!
//! Each line is one event for the engine:
//!
//! ```text
//! {"type":"location","latitude":40.0,"longitude":-74.0}
//! {"type":"location","latitude":40.0,"longitude":-74.0,"timestamp":"2026-05-01T12:00:00Z"}
//! {"type":"triggers_fired","trigger_ids":["101","202"]}
//! ```
//!
//! Location lines are applied in order by one worker task. Trigger lines are
//! dispatched on their own tasks, so a slow place query does not hold them
//! up. Malformed lines are logged and skipped.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use wayfind_types::LocationSample;

use crate::state::AppState;

/// Location samples queued ahead of the ordered worker.
const LOCATION_QUEUE_CAPACITY: usize = 32;

/// One feed line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A position fix.
    Location(LocationSample),
    /// Trigger ids reported by a geofence monitor.
    TriggersFired { trigger_ids: Vec<String> },
}

/// Counts from one feed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub dispatched: usize,
    pub skipped: usize,
}

/// Parse a single feed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<FeedEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Apply one event to the service.
pub async fn apply(state: &AppState, event: FeedEvent) {
    match event {
        FeedEvent::Location(sample) => match state.handle_location(&sample).await {
            Ok(outcome) => debug!(
                "Location ({}, {}): {:?}",
                sample.latitude, sample.longitude, outcome
            ),
            Err(e) => warn!("Location update rejected: {}", e),
        },
        FeedEvent::TriggersFired { trigger_ids } => {
            let results = state.engine.on_triggers_fired(&trigger_ids).await;
            for (id, result) in trigger_ids.iter().zip(results) {
                if let Err(e) = result {
                    warn!("Trigger {} not processed: {}", id, e);
                }
            }
        }
    }
}

/// Read the feed until end of input, dispatching each event on `tracker`.
///
/// Returns once every line has been read; dispatched events may still be
/// running on the tracker. The location worker exits after the last queued
/// sample.
pub async fn run<R>(
    reader: R,
    state: Arc<AppState>,
    tracker: &TaskTracker,
) -> std::io::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();

    let (location_tx, mut location_rx) = mpsc::channel(LOCATION_QUEUE_CAPACITY);
    {
        let state = Arc::clone(&state);
        tracker.spawn(async move {
            while let Some(sample) = location_rx.recv().await {
                apply(&state, FeedEvent::Location(sample)).await;
            }
        });
    }

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            None => {}
            Some(Ok(FeedEvent::Location(sample))) => {
                if location_tx.send(sample).await.is_err() {
                    warn!("Location worker stopped, dropping sample");
                    summary.skipped += 1;
                } else {
                    summary.dispatched += 1;
                }
            }
            Some(Ok(event)) => {
                let state = Arc::clone(&state);
                tracker.spawn(async move { apply(&state, event).await });
                summary.dispatched += 1;
            }
            Some(Err(e)) => {
                warn!("Skipping malformed feed line: {}", e);
                summary.skipped += 1;
            }
        }
    }

    debug!(
        "Feed ended: {} dispatched, {} skipped",
        summary.dispatched, summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_core::mock::{MockPlaceQueryClient, RecordingMonitor};
    use wayfind_store::Store;
    use wayfind_types::PlaceCandidate;

    use crate::config::Config;

    fn test_state(client: Arc<MockPlaceQueryClient>) -> Arc<AppState> {
        let mut config = Config::default();
        config.effects.notifications = false;
        AppState::new(
            Store::open_in_memory().unwrap(),
            config,
            client,
            Arc::new(RecordingMonitor::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_location_line() {
        let line = r#"{"type":"location","latitude":40.0,"longitude":-74.0,"timestamp":"2026-05-01T12:00:00Z"}"#;
        let event = parse_line(line).unwrap().unwrap();
        let FeedEvent::Location(sample) = event else {
            panic!("expected location, got {event:?}");
        };
        assert_eq!(sample.latitude, 40.0);
        assert_eq!(sample.timestamp.year(), 2026);
    }

    #[test]
    fn test_parse_location_without_timestamp() {
        let event = parse_line(r#"{"type":"location","latitude":1.5,"longitude":2.5}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, FeedEvent::Location(ref s) if s.longitude == 2.5));
    }

    #[test]
    fn test_parse_triggers_fired_line() {
        let event = parse_line(r#"{"type":"triggers_fired","trigger_ids":["101","202"]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            FeedEvent::TriggersFired {
                trigger_ids: vec!["101".to_string(), "202".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_blank_and_malformed() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").unwrap().is_err());
        assert!(parse_line(r#"{"type":"teleport"}"#).unwrap().is_err());
    }

    #[tokio::test]
    async fn test_run_feed_end_to_end() {
        let client = Arc::new(MockPlaceQueryClient::new());
        client.set_places(vec![PlaceCandidate::new(
            "101",
            "Springfield",
            40.01,
            -74.01,
            "town",
        )]);
        let state = test_state(client);
        let tracker = TaskTracker::new();

        let arm = b"{\"type\":\"location\",\"latitude\":40.0,\"longitude\":-74.0}\n";
        let summary = run(&arm[..], Arc::clone(&state), &tracker).await.unwrap();
        assert_eq!(summary, FeedSummary { dispatched: 1, skipped: 0 });
        tracker.close();
        tracker.wait().await;

        let fire = b"garbage\n\n{\"type\":\"triggers_fired\",\"trigger_ids\":[\"101\",\"101\"]}\n";
        let tracker = TaskTracker::new();
        let summary = run(&fire[..], Arc::clone(&state), &tracker).await.unwrap();
        assert_eq!(summary, FeedSummary { dispatched: 1, skipped: 1 });
        tracker.close();
        tracker.wait().await;

        let discoveries = state.engine.discoveries().await.unwrap();
        assert_eq!(discoveries.len(), 1);
        assert_eq!(discoveries[0].name, "Springfield");
    }

    #[tokio::test]
    async fn test_location_lines_reach_simulator_in_order() {
        let client = Arc::new(MockPlaceQueryClient::new());
        client.set_places(vec![PlaceCandidate::new(
            "101",
            "Springfield",
            40.0,
            -74.0,
            "town",
        )]);
        let mut config = Config::default();
        config.effects.notifications = false;
        config.discovery.loiter_delay_ms = 30_000;
        let (state, mut fired_rx) =
            AppState::simulated(Store::open_in_memory().unwrap(), config, client).unwrap();

        let feed = concat!(
            r#"{"type":"location","latitude":40.0,"longitude":-74.0,"timestamp":"2026-05-01T12:00:00Z"}"#,
            "\n",
            r#"{"type":"location","latitude":40.0,"longitude":-74.0,"timestamp":"2026-05-01T12:00:10Z"}"#,
            "\n",
            r#"{"type":"location","latitude":40.0,"longitude":-74.0,"timestamp":"2026-05-01T12:00:40Z"}"#,
            "\n",
        );
        let tracker = TaskTracker::new();
        let summary = run(feed.as_bytes(), Arc::clone(&state), &tracker)
            .await
            .unwrap();
        assert_eq!(summary, FeedSummary { dispatched: 3, skipped: 0 });
        tracker.close();
        tracker.wait().await;

        // Dwell counted from the first sample: exactly one fire, at 12:00:40.
        assert_eq!(fired_rx.recv().await.unwrap(), vec!["101".to_string()]);
        assert!(fired_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_location_is_skipped_quietly() {
        let client = Arc::new(MockPlaceQueryClient::new());
        let state = test_state(client.clone());

        apply(&state, FeedEvent::Location(LocationSample::now(f64::NAN, 0.0))).await;
        assert_eq!(client.fetch_count(), 0);
    }
}

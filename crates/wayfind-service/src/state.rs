//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! Engine events reach WebSocket clients through a broadcast channel:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: A subscriber that falls behind loses the oldest events
//! - **No blocking**: The engine never waits on slow subscribers
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8787"
//! broadcast_buffer = 200
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;

use wayfind_core::{
    DiscoveryEngine, EventDispatcher, GeofenceMonitor, LocationOutcome, PlaceQueryClient,
    SharedEngine,
};
use wayfind_store::Store;
use wayfind_types::LocationSample;

use crate::backend::{SharedStore, SqliteBackend, shared};
use crate::config::Config;
use crate::monitor::{FiredReceiver, ProximityMonitor};
use crate::sinks::build_effects;

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the engine's storage adapters.
    pub store: SharedStore,
    /// The discovery engine.
    pub engine: SharedEngine,
    /// Configuration the service was started with.
    pub config: Config,
    /// When the service started.
    pub started_at: OffsetDateTime,
    /// In-process monitor fed with every location sample, when simulating.
    pub simulator: Option<Arc<ProximityMonitor>>,
}

impl AppState {
    /// Wire the store, engine, and effect sinks together.
    ///
    /// The event buffer size comes from `config.server.broadcast_buffer`.
    pub fn new(
        store: Store,
        config: Config,
        client: Arc<dyn PlaceQueryClient>,
        monitor: Arc<dyn GeofenceMonitor>,
    ) -> wayfind_core::Result<Arc<Self>> {
        Self::build(store, config, client, monitor, None)
    }

    /// Like [`new`](Self::new), with a [`ProximityMonitor`] standing in for
    /// the platform geofence service.
    ///
    /// Fired trigger ids arrive on the returned receiver.
    pub fn simulated(
        store: Store,
        config: Config,
        client: Arc<dyn PlaceQueryClient>,
    ) -> wayfind_core::Result<(Arc<Self>, FiredReceiver)> {
        let (monitor, fired_rx) = ProximityMonitor::new();
        let monitor = Arc::new(monitor);
        let state = Self::build(store, config, client, monitor.clone(), Some(monitor))?;
        Ok((state, fired_rx))
    }

    fn build(
        store: Store,
        config: Config,
        client: Arc<dyn PlaceQueryClient>,
        monitor: Arc<dyn GeofenceMonitor>,
        simulator: Option<Arc<ProximityMonitor>>,
    ) -> wayfind_core::Result<Arc<Self>> {
        let store = shared(store);
        let backend = Arc::new(SqliteBackend::new(Arc::clone(&store)));

        let engine = DiscoveryEngine::new(
            config.engine_config(),
            client,
            backend.clone(),
            backend,
            monitor,
        )?
        .with_effects(build_effects(&config.effects))
        .with_events(EventDispatcher::new(config.server.broadcast_buffer));

        Ok(Arc::new(Self {
            store,
            engine: Arc::new(engine),
            config,
            started_at: OffsetDateTime::now_utc(),
            simulator,
        }))
    }

    /// Hand a location sample to the engine, then to the simulated monitor.
    pub async fn handle_location(
        &self,
        sample: &LocationSample,
    ) -> wayfind_core::Result<LocationOutcome> {
        let outcome = self.engine.on_location_update(sample).await?;
        if let Some(simulator) = &self.simulator {
            simulator.observe(sample).await;
        }
        Ok(outcome)
    }

    /// Deliver fired trigger batches to the engine until the channel closes.
    pub async fn run_fired_consumer(self: Arc<Self>, mut fired_rx: FiredReceiver) {
        while let Some(ids) = fired_rx.recv().await {
            for (id, result) in ids.iter().zip(self.engine.on_triggers_fired(&ids).await) {
                if let Err(e) = result {
                    warn!("Trigger {} not processed: {}", id, e);
                }
            }
        }
    }
}

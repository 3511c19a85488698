//! The place discovery engine.
//!
//! Two independent event streams drive the engine:
//!
//! - **Location updates** pass through the [`FetchThrottle`]; when the user has
//!   moved far enough, nearby places are fetched and their triggers armed.
//! - **Trigger fires** are resolved through the durable registry and turned
//!   into at most one [`DiscoveryRecord`] per place, plus effects.
//!
//! Per place the engine moves `Unseen -> Candidate -> Discovered`. The state
//! is implicit: a place is a candidate while it has a durable registration
//! and discovered once the store holds its record. Because resolution is
//! durable, a fire can move a place straight to `Discovered` in a process
//! that never saw it as a candidate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wayfind_core::mock::{
//!     MemoryDiscoveryStore, MemoryTriggerStore, MockPlaceQueryClient, RecordingMonitor,
//! };
//! use wayfind_core::{DiscoveryEngine, EngineConfig, TriggerOutcome};
//! use wayfind_types::{LocationSample, PlaceCandidate};
//!
//! # #[tokio::main]
//! # async fn main() -> wayfind_core::Result<()> {
//! let client = Arc::new(MockPlaceQueryClient::new());
//! client.set_places(vec![PlaceCandidate::new("101", "Springfield", 40.01, -74.01, "town")]);
//!
//! let engine = DiscoveryEngine::new(
//!     EngineConfig::default(),
//!     client,
//!     Arc::new(MemoryDiscoveryStore::new()),
//!     Arc::new(MemoryTriggerStore::new()),
//!     Arc::new(RecordingMonitor::new()),
//! )?;
//!
//! engine.on_location_update(&LocationSample::now(40.0, -74.0)).await?;
//! let outcome = engine.on_trigger_fired("101").await?;
//! assert!(matches!(outcome, TriggerOutcome::Discovered(_)));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::future::join_all;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use wayfind_types::{Coordinate, DiscoveryRecord, LocationSample, TriggerRegistration};

use crate::effects::EffectDispatcher;
use crate::error::{Error, QueryError, Result};
use crate::events::{EngineEvent, EventDispatcher, EventReceiver};
use crate::registry::{DEFAULT_LOITER_DELAY_MS, DEFAULT_TRIGGER_RADIUS_M, GeofenceRegistry};
use crate::throttle::{DEFAULT_MOVE_THRESHOLD_M, FetchThrottle};
use crate::traits::{DiscoveryStore, GeofenceMonitor, PlaceQueryClient, TriggerStore};

/// Default radius for place queries in meters.
pub const DEFAULT_QUERY_RADIUS_M: u32 = 15_000;

/// Tunables for the discovery engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Movement in meters required before a new place query.
    pub move_threshold_m: f64,
    /// Radius of each place query in meters.
    pub query_radius_m: u32,
    /// Radius of each armed trigger in meters.
    pub trigger_radius_m: f64,
    /// Loitering delay before a trigger's first event is honored.
    pub loiter_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_threshold_m: DEFAULT_MOVE_THRESHOLD_M,
            query_radius_m: DEFAULT_QUERY_RADIUS_M,
            trigger_radius_m: DEFAULT_TRIGGER_RADIUS_M,
            loiter_delay_ms: DEFAULT_LOITER_DELAY_MS,
        }
    }
}

impl EngineConfig {
    /// Check that every distance is positive and finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.move_threshold_m.is_finite() && self.move_threshold_m > 0.0) {
            return Err(Error::invalid_config(format!(
                "move threshold must be positive, got {}",
                self.move_threshold_m
            )));
        }
        if self.query_radius_m == 0 {
            return Err(Error::invalid_config("query radius must be positive"));
        }
        if !(self.trigger_radius_m.is_finite() && self.trigger_radius_m > 0.0) {
            return Err(Error::invalid_config(format!(
                "trigger radius must be positive, got {}",
                self.trigger_radius_m
            )));
        }
        Ok(())
    }
}

/// Result of handling one location sample.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Not far enough from the last successful fetch.
    Throttled,
    /// The place query failed; nothing changed and the next update retries.
    FetchFailed(QueryError),
    /// The fetch succeeded and these registrations are now armed.
    Armed(Vec<TriggerRegistration>),
}

/// Result of handling one fired trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// No durable registration for the trigger id; the event was dropped.
    Unresolved,
    /// The place was already discovered; no effects were emitted.
    AlreadyDiscovered,
    /// First discovery of the place; effects were dispatched.
    Discovered(DiscoveryRecord),
}

/// Orchestrates fetching, arming, and exactly-once discovery.
///
/// All handlers take `&self`; share the engine behind an `Arc` and call them
/// from as many tasks as needed.
pub struct DiscoveryEngine {
    config: EngineConfig,
    client: Arc<dyn PlaceQueryClient>,
    discoveries: Arc<dyn DiscoveryStore>,
    registry: GeofenceRegistry,
    /// Held across the throttle check, fetch, and arm of one update.
    throttle: Mutex<FetchThrottle>,
    effects: EffectDispatcher,
    events: EventDispatcher,
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

impl DiscoveryEngine {
    /// Build an engine from its collaborators.
    ///
    /// Starts with no effect sinks and a private event channel; see
    /// [`with_effects`](Self::with_effects) and [`with_events`](Self::with_events).
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn PlaceQueryClient>,
        discoveries: Arc<dyn DiscoveryStore>,
        triggers: Arc<dyn TriggerStore>,
        monitor: Arc<dyn GeofenceMonitor>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = GeofenceRegistry::new(triggers, monitor)
            .with_geometry(config.trigger_radius_m, config.loiter_delay_ms);

        Ok(Self {
            throttle: Mutex::new(FetchThrottle::new(config.move_threshold_m)),
            config,
            client,
            discoveries,
            registry,
            effects: EffectDispatcher::new(),
            events: EventDispatcher::default(),
        })
    }

    /// Use these effect sinks for new discoveries.
    pub fn with_effects(mut self, effects: EffectDispatcher) -> Self {
        self.effects = effects;
        self
    }

    /// Publish engine events on an existing dispatcher.
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &GeofenceRegistry {
        &self.registry
    }

    pub fn effects(&self) -> &EffectDispatcher {
        &self.effects
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Coordinate of the last successful fetch, if any.
    pub async fn fetch_anchor(&self) -> Option<Coordinate> {
        self.throttle.lock().await.anchor()
    }

    /// All discoveries, newest first.
    pub async fn discoveries(&self) -> Result<Vec<DiscoveryRecord>> {
        self.discoveries
            .list_all()
            .await
            .map_err(|e| Error::storage("list discoveries", e))
    }

    /// Handle a location sample.
    ///
    /// Query failures are recovered here: they are logged, published as
    /// [`EngineEvent::FetchFailed`], and leave the throttle anchor untouched.
    /// Only storage failures and invalid coordinates are returned as errors.
    pub async fn on_location_update(&self, sample: &LocationSample) -> Result<LocationOutcome> {
        let here = Coordinate::try_new(sample.latitude, sample.longitude)?;

        // Two updates arriving together must not both pass against a stale anchor.
        let mut throttle = self.throttle.lock().await;

        if !throttle.should_fetch(&here) {
            debug!("Within {} m of last fetch, skipping {}", throttle.threshold_m(), here);
            return Ok(LocationOutcome::Throttled);
        }

        info!(
            "Querying places within {} m of {}",
            self.config.query_radius_m, here
        );
        let candidates = match self
            .client
            .fetch_nearby(here, self.config.query_radius_m)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Place query failed, will retry on next update: {}", e);
                self.events.send(EngineEvent::FetchFailed {
                    error: e.to_string(),
                });
                return Ok(LocationOutcome::FetchFailed(e));
            }
        };

        let named: Vec<_> = candidates
            .into_iter()
            .filter(|c| {
                if !c.has_name() {
                    debug!("Dropping nameless place {}", c.place_id);
                }
                c.has_name()
            })
            .collect();

        let registrations = match self.registry.arm(&named).await {
            Ok(registrations) => registrations,
            Err(e) => {
                error!("Failed to record triggers: {}", e);
                return Err(e);
            }
        };

        // Only now is the cycle complete; a storage failure above leaves the
        // anchor in place so the next update retries.
        throttle.record_fetch(here);
        drop(throttle);

        info!("Armed {} triggers around {}", registrations.len(), here);
        if !registrations.is_empty() {
            self.events.send(EngineEvent::TriggersArmed {
                place_ids: registrations.iter().map(|r| r.place_id.clone()).collect(),
            });
        }

        Ok(LocationOutcome::Armed(registrations))
    }

    /// Handle a fired trigger.
    ///
    /// Unknown ids are logged and dropped. A place already in the store yields
    /// [`TriggerOutcome::AlreadyDiscovered`] and no effects. Storage failures
    /// are returned and not retried; a later fire for the same id retries.
    pub async fn on_trigger_fired(&self, trigger_id: &str) -> Result<TriggerOutcome> {
        let place = match self.registry.resolve(trigger_id).await {
            Ok(Some(place)) => place,
            Ok(None) => {
                warn!("Dropping fire for unknown trigger {}", trigger_id);
                self.events.send(EngineEvent::TriggerUnresolved {
                    trigger_id: trigger_id.to_string(),
                });
                return Ok(TriggerOutcome::Unresolved);
            }
            Err(e) => {
                error!("Failed to resolve trigger {}: {}", trigger_id, e);
                return Err(e);
            }
        };

        let seen = self
            .discoveries
            .exists(&place.place_id)
            .await
            .map_err(|e| self.storage_failure("check discovery", e))?;
        if seen {
            debug!("{} already discovered", place.place_id);
            return Ok(TriggerOutcome::AlreadyDiscovered);
        }

        let record = DiscoveryRecord::from_place(&place, OffsetDateTime::now_utc());
        let inserted = self
            .discoveries
            .insert_if_absent(&record)
            .await
            .map_err(|e| self.storage_failure("insert discovery", e))?;

        // A concurrent fire for the same place won the insert.
        if !inserted {
            debug!("{} discovered by a concurrent fire", place.place_id);
            return Ok(TriggerOutcome::AlreadyDiscovered);
        }

        info!("Discovered {} ({})", record.name, record.place_id);
        self.effects.dispatch(&record.name);
        self.events.send(EngineEvent::Discovered {
            record: record.clone(),
        });

        Ok(TriggerOutcome::Discovered(record))
    }

    /// Handle a batch of fired triggers.
    ///
    /// Each id is processed independently and concurrently; one failure does
    /// not affect the others. Results are returned in input order.
    pub async fn on_triggers_fired<S: AsRef<str>>(
        &self,
        trigger_ids: &[S],
    ) -> Vec<Result<TriggerOutcome>> {
        join_all(
            trigger_ids
                .iter()
                .map(|id| self.on_trigger_fired(id.as_ref())),
        )
        .await
    }

    fn storage_failure(&self, operation: &'static str, source: crate::StorageError) -> Error {
        let err = Error::storage(operation, source);
        error!("{}", err);
        err
    }
}

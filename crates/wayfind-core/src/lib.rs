//! Place discovery engine.
//!
//! This crate tracks a moving position, discovers nearby named places
//! through a [`PlaceQueryClient`], arms proximity triggers around them, and
//! records each place the user physically reaches exactly once.
//!
//! # Features
//!
//! - **Throttled fetching**: one place query per meaningful displacement
//! - **Durable trigger resolution**: fires resolve after a restart
//! - **Exactly-once discovery**: duplicate, delayed, or concurrent fires yield one record
//! - **Fire-and-forget effects**: notification and sound sinks never fail a discovery
//! - **Event stream**: presentation layers subscribe to [`EngineEvent`]s
//! - **Overpass client** (feature `overpass`): OpenStreetMap place lookup
//!
//! # Architecture
//!
//! ```text
//! location sample ──▶ DiscoveryEngine::on_location_update
//!                       ├─ FetchThrottle (gate)
//!                       ├─ PlaceQueryClient::fetch_nearby
//!                       └─ GeofenceRegistry::arm ──▶ TriggerStore + GeofenceMonitor
//!
//! trigger fired   ──▶ DiscoveryEngine::on_trigger_fired
//!                       ├─ GeofenceRegistry::resolve ◀── TriggerStore
//!                       ├─ DiscoveryStore::insert_if_absent
//!                       └─ EffectDispatcher + EventDispatcher
//! ```
//!
//! Storage, the platform monitor, and effects are collaborator traits in
//! [`traits`]; [`mock`] provides in-memory versions.

pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod mock;
#[cfg(feature = "overpass")]
pub mod overpass;
pub mod registry;
pub mod throttle;
pub mod traits;

// Core exports
pub use engine::{
    DEFAULT_QUERY_RADIUS_M, DiscoveryEngine, EngineConfig, LocationOutcome, TriggerOutcome,
};
pub use error::{EffectError, Error, MonitorError, QueryError, Result, StorageError, StorageResult};
pub use registry::{DEFAULT_LOITER_DELAY_MS, DEFAULT_TRIGGER_RADIUS_M, GeofenceRegistry};
pub use throttle::{DEFAULT_MOVE_THRESHOLD_M, FetchThrottle};
pub use traits::{DiscoveryStore, EffectSink, GeofenceMonitor, PlaceQueryClient, TriggerStore};

pub use effects::EffectDispatcher;
pub use events::{EngineEvent, EventDispatcher, EventReceiver, EventSender};

#[cfg(feature = "overpass")]
pub use overpass::OverpassClient;

/// Type alias for a shared engine reference.
///
/// Location and trigger handlers run on separate tasks; share one engine
/// between them through an `Arc`.
pub type SharedEngine = std::sync::Arc<DiscoveryEngine>;

// Re-export from wayfind-types
pub use wayfind_types::{
    ArmRequest, ArmedPlace, Coordinate, DiscoveryRecord, LocationSample, PlaceCandidate,
    TransitionType, TriggerRegistration, UpsertOutcome,
};

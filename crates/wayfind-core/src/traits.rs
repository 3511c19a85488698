//! Collaborator traits consumed by the discovery engine.
//!
//! The engine never talks to the network, the database, the platform
//! geofence primitive, or the notification system directly. Each is reached
//! through one of these traits so that production adapters and the in-memory
//! doubles in [`crate::mock`] are interchangeable.

use async_trait::async_trait;

use wayfind_types::{ArmRequest, ArmedPlace, Coordinate, DiscoveryRecord, PlaceCandidate, UpsertOutcome};

use crate::error::{EffectError, MonitorError, QueryError, StorageResult};

/// Remote lookup of named places around a coordinate.
///
/// Implementations are expected to drop nameless results before returning.
///
/// # Example
///
/// ```ignore
/// use wayfind_core::PlaceQueryClient;
///
/// async fn count_nearby<C: PlaceQueryClient>(client: &C, here: Coordinate) -> usize {
///     client.fetch_nearby(here, 15_000).await.map(|c| c.len()).unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait PlaceQueryClient: Send + Sync {
    /// Fetch candidate places within `radius_m` meters of `center`.
    async fn fetch_nearby(
        &self,
        center: Coordinate,
        radius_m: u32,
    ) -> std::result::Result<Vec<PlaceCandidate>, QueryError>;
}

/// Durable, idempotent log of discovered places.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Whether a record exists for the place id.
    async fn exists(&self, place_id: &str) -> StorageResult<bool>;

    /// Insert the record unless one already exists for its place id.
    ///
    /// Must be a true insert-or-ignore at the storage layer: when called
    /// concurrently for the same place id, exactly one call returns `true`.
    async fn insert_if_absent(&self, record: &DiscoveryRecord) -> StorageResult<bool>;

    /// All records, newest first.
    async fn list_all(&self) -> StorageResult<Vec<DiscoveryRecord>>;
}

/// Durable table of armed triggers, keyed by place id.
///
/// Backs trigger resolution, so it must outlive the process that armed them.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Create or replace the entry for `armed.registration.place_id`.
    async fn upsert(&self, armed: &ArmedPlace) -> StorageResult<UpsertOutcome>;

    async fn get(&self, place_id: &str) -> StorageResult<Option<ArmedPlace>>;

    /// Remove an entry. Returns whether one existed.
    async fn remove(&self, place_id: &str) -> StorageResult<bool>;

    async fn list(&self) -> StorageResult<Vec<ArmedPlace>>;
}

/// The platform's proximity-trigger primitive (produced side).
///
/// Fire events travel the other way and reach the engine through
/// [`DiscoveryEngine::on_trigger_fired`](crate::DiscoveryEngine::on_trigger_fired).
#[async_trait]
pub trait GeofenceMonitor: Send + Sync {
    /// Start (or restart) monitoring a region.
    async fn arm(&self, request: &ArmRequest) -> std::result::Result<(), MonitorError>;

    /// Stop monitoring a region.
    async fn disarm(&self, place_id: &str) -> std::result::Result<(), MonitorError>;
}

/// A best-effort side effect run once per new discovery.
#[async_trait]
pub trait EffectSink: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// React to the discovery of the named place.
    async fn on_discovery(&self, place_name: &str) -> std::result::Result<(), EffectError>;
}

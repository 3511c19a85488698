//! In-memory collaborators for testing.
//!
//! These implement the engine's collaborator traits without a network,
//! database, or platform monitor, so engine behavior can be exercised
//! deterministically.
//!
//! # Features
//!
//! - **Failure injection**: make the query client or a sink fail on demand
//! - **Call recording**: inspect fetches, arm requests, and effect calls
//! - **Shared state**: clone the `Arc`s into a second engine to simulate a restart
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wayfind_core::mock::{MemoryDiscoveryStore, MockPlaceQueryClient};
//! use wayfind_core::PlaceQueryClient;
//! use wayfind_types::{Coordinate, PlaceCandidate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MockPlaceQueryClient::new();
//!     client.set_places(vec![PlaceCandidate::new("101", "Springfield", 40.01, -74.01, "town")]);
//!
//!     let places = client.fetch_nearby(Coordinate::new(40.0, -74.0), 15_000).await.unwrap();
//!     assert_eq!(places.len(), 1);
//!     assert_eq!(client.fetch_count(), 1);
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use wayfind_types::{
    ArmRequest, ArmedPlace, Coordinate, DiscoveryRecord, PlaceCandidate, UpsertOutcome,
};

use crate::error::{EffectError, MonitorError, QueryError, StorageError, StorageResult};
use crate::traits::{DiscoveryStore, EffectSink, GeofenceMonitor, PlaceQueryClient, TriggerStore};

// Poisoning only happens if a test already panicked while holding the lock.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scripted [`PlaceQueryClient`].
#[derive(Debug, Default)]
pub struct MockPlaceQueryClient {
    places: Mutex<Vec<PlaceCandidate>>,
    requests: Mutex<Vec<(Coordinate, u32)>>,
    fetch_count: AtomicU32,
    should_fail: AtomicBool,
    /// Number of calls to fail before succeeding again.
    remaining_failures: AtomicU32,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockPlaceQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the places returned by every subsequent fetch.
    pub fn set_places(&self, places: Vec<PlaceCandidate>) {
        *lock(&self.places) = places;
    }

    /// Make every fetch fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches, then recover.
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of fetch calls made, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Centers and radii of every fetch, in call order.
    pub fn requests(&self) -> Vec<(Coordinate, u32)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PlaceQueryClient for MockPlaceQueryClient {
    async fn fetch_nearby(
        &self,
        center: Coordinate,
        radius_m: u32,
    ) -> Result<Vec<PlaceCandidate>, QueryError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.requests).push((center, radius_m));

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(QueryError::Network("mock transient failure".to_string()));
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(QueryError::Service {
                status: 503,
                message: "mock failure".to_string(),
            });
        }

        Ok(lock(&self.places).clone())
    }
}

/// A [`DiscoveryStore`] backed by a map, with optional failure injection.
#[derive(Debug, Default)]
pub struct MemoryDiscoveryStore {
    records: Mutex<Vec<DiscoveryRecord>>,
    insert_attempts: AtomicU32,
    should_fail: AtomicBool,
}

impl MemoryDiscoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store call fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Number of `insert_if_absent` calls, accepted or not.
    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::Relaxed)
    }

    /// Records in insertion order.
    pub fn records(&self) -> Vec<DiscoveryRecord> {
        lock(&self.records).clone()
    }

    fn check(&self) -> StorageResult<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(StorageError::from("mock storage failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoveryStore for MemoryDiscoveryStore {
    async fn exists(&self, place_id: &str) -> StorageResult<bool> {
        self.check()?;
        Ok(lock(&self.records).iter().any(|r| r.place_id == place_id))
    }

    async fn insert_if_absent(&self, record: &DiscoveryRecord) -> StorageResult<bool> {
        self.insert_attempts.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        // Check and push under one lock so concurrent callers see a single winner.
        let mut records = lock(&self.records);
        if records.iter().any(|r| r.place_id == record.place_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn list_all(&self) -> StorageResult<Vec<DiscoveryRecord>> {
        self.check()?;
        let records = lock(&self.records);
        // Newest first; later inserts win ties.
        let mut indexed: Vec<(usize, &DiscoveryRecord)> = records.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.discovered_at
                .cmp(&a.discovered_at)
                .then_with(|| ib.cmp(ia))
        });
        Ok(indexed.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

/// A [`TriggerStore`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryTriggerStore {
    entries: Mutex<BTreeMap<String, ArmedPlace>>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn upsert(&self, armed: &ArmedPlace) -> StorageResult<UpsertOutcome> {
        let mut entries = lock(&self.entries);
        let key = armed.registration.place_id.clone();
        let outcome = match entries.get(&key) {
            Some(current) if current.same_content(armed) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Created,
        };
        entries.insert(key, armed.clone());
        Ok(outcome)
    }

    async fn get(&self, place_id: &str) -> StorageResult<Option<ArmedPlace>> {
        Ok(lock(&self.entries).get(place_id).cloned())
    }

    async fn remove(&self, place_id: &str) -> StorageResult<bool> {
        Ok(lock(&self.entries).remove(place_id).is_some())
    }

    async fn list(&self) -> StorageResult<Vec<ArmedPlace>> {
        Ok(lock(&self.entries).values().cloned().collect())
    }
}

/// A [`GeofenceMonitor`] that records requests and tracks the active set.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    arm_requests: Mutex<Vec<ArmRequest>>,
    disarmed: Mutex<Vec<String>>,
    active: Mutex<HashMap<String, ArmRequest>>,
    should_fail: AtomicBool,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make arm and disarm fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Every arm request received, in order.
    pub fn arm_requests(&self) -> Vec<ArmRequest> {
        lock(&self.arm_requests).clone()
    }

    /// Every place id disarmed, in order.
    pub fn disarmed(&self) -> Vec<String> {
        lock(&self.disarmed).clone()
    }

    /// Number of regions currently monitored. Re-arming a place id replaces it.
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_active(&self, place_id: &str) -> bool {
        lock(&self.active).contains_key(place_id)
    }
}

#[async_trait]
impl GeofenceMonitor for RecordingMonitor {
    async fn arm(&self, request: &ArmRequest) -> Result<(), MonitorError> {
        lock(&self.arm_requests).push(request.clone());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(MonitorError("mock monitor failure".to_string()));
        }
        lock(&self.active).insert(request.place_id.clone(), request.clone());
        Ok(())
    }

    async fn disarm(&self, place_id: &str) -> Result<(), MonitorError> {
        lock(&self.disarmed).push(place_id.to_string());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(MonitorError("mock monitor failure".to_string()));
        }
        lock(&self.active).remove(place_id);
        Ok(())
    }
}

/// An [`EffectSink`] that records the names it was called with.
#[derive(Debug)]
pub struct RecordingSink {
    label: String,
    calls: Mutex<Vec<String>>,
    should_fail: AtomicBool,
}

impl RecordingSink {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            calls: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Make every call fail (the call is still recorded).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl EffectSink for RecordingSink {
    fn name(&self) -> &str {
        &self.label
    }

    async fn on_discovery(&self, place_name: &str) -> Result<(), EffectError> {
        lock(&self.calls).push(place_name.to_string());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(EffectError::PermissionDenied(format!(
                "{} disabled",
                self.label
            )));
        }
        Ok(())
    }
}

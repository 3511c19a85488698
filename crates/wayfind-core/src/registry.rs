//! Durable mapping from place ids to armed proximity triggers.
//!
//! The registry turns query results into trigger registrations and turns
//! fired trigger ids back into place data. Both directions go through a
//! [`TriggerStore`], never through in-process memory: a trigger may fire long
//! after the process that armed it is gone.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use wayfind_types::{ArmedPlace, PlaceCandidate, TriggerRegistration, UpsertOutcome};

use crate::error::{Error, Result};
use crate::traits::{GeofenceMonitor, TriggerStore};

/// Default trigger radius in meters.
pub const DEFAULT_TRIGGER_RADIUS_M: f64 = 500.0;

/// Default loitering delay before the first enter/dwell event is honored.
pub const DEFAULT_LOITER_DELAY_MS: u64 = 30_000;

/// Arms, resolves, and clears proximity triggers.
pub struct GeofenceRegistry {
    triggers: Arc<dyn TriggerStore>,
    monitor: Arc<dyn GeofenceMonitor>,
    radius_m: f64,
    loiter_delay_ms: u64,
}

impl std::fmt::Debug for GeofenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeofenceRegistry")
            .field("radius_m", &self.radius_m)
            .field("loiter_delay_ms", &self.loiter_delay_ms)
            .finish_non_exhaustive()
    }
}

impl GeofenceRegistry {
    /// Create a registry with the default radius and loitering delay.
    pub fn new(triggers: Arc<dyn TriggerStore>, monitor: Arc<dyn GeofenceMonitor>) -> Self {
        Self {
            triggers,
            monitor,
            radius_m: DEFAULT_TRIGGER_RADIUS_M,
            loiter_delay_ms: DEFAULT_LOITER_DELAY_MS,
        }
    }

    /// Override the region geometry used for new registrations.
    pub fn with_geometry(mut self, radius_m: f64, loiter_delay_ms: u64) -> Self {
        self.radius_m = radius_m;
        self.loiter_delay_ms = loiter_delay_ms;
        self
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn loiter_delay_ms(&self) -> u64 {
        self.loiter_delay_ms
    }

    /// Create or replace one registration per candidate.
    ///
    /// Candidates sharing a place id collapse to the last one. A region whose
    /// durable content is unchanged is not re-sent to the monitor, so arming
    /// the same places repeatedly never creates duplicate triggers.
    ///
    /// Returns the registrations in first-seen order.
    pub async fn arm(&self, candidates: &[PlaceCandidate]) -> Result<Vec<TriggerRegistration>> {
        let armed_at = OffsetDateTime::now_utc();
        let mut registrations = Vec::with_capacity(candidates.len());

        for place in dedup_last_wins(candidates) {
            let registration = TriggerRegistration {
                place_id: place.place_id.clone(),
                center_lat: place.latitude,
                center_lon: place.longitude,
                radius_m: self.radius_m,
                loiter_delay_ms: self.loiter_delay_ms,
                armed_at,
            };
            let armed = ArmedPlace {
                place: place.clone(),
                registration,
            };

            let outcome = self
                .triggers
                .upsert(&armed)
                .await
                .map_err(|e| Error::storage("record trigger", e))?;

            match outcome {
                UpsertOutcome::Unchanged => {
                    debug!("Trigger for {} already armed", place.place_id);
                }
                UpsertOutcome::Created | UpsertOutcome::Replaced => {
                    debug!("Arming trigger for {} ({:?})", place.place_id, outcome);
                    self.send_arm(&armed.registration).await;
                }
            }

            registrations.push(armed.registration);
        }

        Ok(registrations)
    }

    /// Map a fired trigger id back to its place.
    ///
    /// Returns `Ok(None)` for ids with no durable registration.
    pub async fn resolve(&self, trigger_id: &str) -> Result<Option<PlaceCandidate>> {
        let armed = self
            .triggers
            .get(trigger_id)
            .await
            .map_err(|e| Error::storage("resolve trigger", e))?;
        Ok(armed.map(|a| a.place))
    }

    /// Re-send every durable registration to the monitor.
    ///
    /// Platform monitors can lose their regions across restarts while the
    /// durable table survives. Returns the number of regions sent.
    pub async fn rearm_all(&self) -> Result<usize> {
        let entries = self
            .triggers
            .list()
            .await
            .map_err(|e| Error::storage("list triggers", e))?;

        for entry in &entries {
            self.send_arm(&entry.registration).await;
        }

        info!("Re-armed {} durable triggers", entries.len());
        Ok(entries.len())
    }

    /// Remove a registration and stop monitoring it.
    ///
    /// Returns whether a registration existed. Once cleared, later fires for
    /// the id no longer resolve.
    pub async fn clear(&self, place_id: &str) -> Result<bool> {
        let removed = self
            .triggers
            .remove(place_id)
            .await
            .map_err(|e| Error::storage("remove trigger", e))?;

        if removed {
            if let Err(e) = self.monitor.disarm(place_id).await {
                warn!("Failed to disarm trigger {}: {}", place_id, e);
            }
            info!("Cleared trigger {}", place_id);
        }

        Ok(removed)
    }

    /// All durable registrations.
    pub async fn registrations(&self) -> Result<Vec<ArmedPlace>> {
        self.triggers
            .list()
            .await
            .map_err(|e| Error::storage("list triggers", e))
    }

    async fn send_arm(&self, registration: &TriggerRegistration) {
        let request = registration.to_arm_request();
        if let Err(e) = self.monitor.arm(&request).await {
            // The durable row stays; rearm_all retries it.
            warn!("Monitor rejected trigger {}: {}", registration.place_id, e);
        }
    }
}

/// Keep one candidate per place id: the last occurrence, at the position of the first.
fn dedup_last_wins(candidates: &[PlaceCandidate]) -> Vec<&PlaceCandidate> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&PlaceCandidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match positions.get(candidate.place_id.as_str()) {
            Some(&idx) => unique[idx] = candidate,
            None => {
                positions.insert(candidate.place_id.as_str(), unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

//! Geofence monitors for hosts without a platform geofencing service.
//!
//! [`ProximityMonitor`] evaluates armed regions against the same location
//! samples the engine receives and reports fired trigger ids on an mpsc
//! channel. [`LoggingMonitor`] only records what would have been armed, for
//! setups where trigger events arrive from outside (API or feed).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info};

use wayfind_core::{GeofenceMonitor, MonitorError};
use wayfind_types::{ArmRequest, LocationSample};

/// Capacity of the fired-trigger channel.
pub const FIRED_CHANNEL_CAPACITY: usize = 64;

/// Receiver of fired trigger id batches.
pub type FiredReceiver = mpsc::Receiver<Vec<String>>;

#[derive(Debug)]
struct Region {
    request: ArmRequest,
    entered_at: Option<OffsetDateTime>,
    fired: bool,
}

impl Region {
    fn new(request: ArmRequest) -> Self {
        Self {
            request,
            entered_at: None,
            fired: false,
        }
    }

    fn contains(&self, sample: &LocationSample) -> bool {
        self.request.contains(&sample.coordinate())
    }

    /// Advance the region with one sample; returns true when it fires.
    fn observe(&mut self, sample: &LocationSample) -> bool {
        if !self.contains(sample) {
            self.entered_at = None;
            self.fired = false;
            return false;
        }

        let entered_at = *self.entered_at.get_or_insert(sample.timestamp);
        if self.fired {
            return false;
        }

        let delay = time::Duration::milliseconds(
            i64::try_from(self.request.loiter_delay_ms).unwrap_or(i64::MAX),
        );
        if sample.timestamp - entered_at >= delay {
            self.fired = true;
            return true;
        }
        false
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    regions: HashMap<String, Region>,
    last_sample: Option<LocationSample>,
}

/// In-process proximity monitor with dwell semantics.
///
/// A region fires once a sample has been inside it for the loitering delay,
/// measured on sample timestamps. Leaving the region resets it. Samples older
/// than the last one observed are ignored. A region
/// armed while the last observed sample is already inside counts as entered
/// at that sample.
#[derive(Debug)]
pub struct ProximityMonitor {
    state: Mutex<MonitorState>,
    fired_tx: mpsc::Sender<Vec<String>>,
}

impl ProximityMonitor {
    /// Create a monitor and the receiver its fires are delivered on.
    pub fn new() -> (Self, FiredReceiver) {
        let (fired_tx, fired_rx) = mpsc::channel(FIRED_CHANNEL_CAPACITY);
        let monitor = Self {
            state: Mutex::new(MonitorState::default()),
            fired_tx,
        };
        (monitor, fired_rx)
    }

    /// Number of armed regions.
    pub fn active_count(&self) -> usize {
        self.lock().regions.len()
    }

    pub fn is_armed(&self, place_id: &str) -> bool {
        self.lock().regions.contains_key(place_id)
    }

    /// Evaluate every armed region against a sample.
    ///
    /// Returns the ids that fired and also sends them on the fired channel.
    pub async fn observe(&self, sample: &LocationSample) -> Vec<String> {
        let fired = {
            let mut state = self.lock();
            if let Some(last) = &state.last_sample
                && sample.timestamp < last.timestamp
            {
                debug!(
                    "Ignoring sample at {} older than {}",
                    sample.timestamp, last.timestamp
                );
                return Vec::new();
            }
            state.last_sample = Some(sample.clone());
            let mut fired: Vec<String> = state
                .regions
                .iter_mut()
                .filter_map(|(id, region)| region.observe(sample).then(|| id.clone()))
                .collect();
            fired.sort();
            fired
        };

        if !fired.is_empty() {
            info!("Geofence fired for {:?}", fired);
            if self.fired_tx.send(fired.clone()).await.is_err() {
                debug!("No consumer for fired triggers");
            }
        }
        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        // A poisoned lock only means a panic mid-update; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GeofenceMonitor for ProximityMonitor {
    async fn arm(&self, request: &ArmRequest) -> Result<(), MonitorError> {
        if !(request.radius_m.is_finite() && request.radius_m > 0.0) {
            return Err(MonitorError(format!(
                "invalid radius {} for {}",
                request.radius_m, request.place_id
            )));
        }

        let mut state = self.lock();
        let mut region = Region::new(request.clone());
        if let Some(sample) = &state.last_sample
            && region.contains(sample)
        {
            region.entered_at = Some(sample.timestamp);
        }
        state.regions.insert(request.place_id.clone(), region);
        debug!(
            "Armed region {} ({} m, loiter {} ms)",
            request.place_id, request.radius_m, request.loiter_delay_ms
        );
        Ok(())
    }

    async fn disarm(&self, place_id: &str) -> Result<(), MonitorError> {
        if self.lock().regions.remove(place_id).is_some() {
            debug!("Disarmed region {}", place_id);
        }
        Ok(())
    }
}

/// Monitor that only logs arm and disarm requests.
#[derive(Debug, Default)]
pub struct LoggingMonitor;

#[async_trait]
impl GeofenceMonitor for LoggingMonitor {
    async fn arm(&self, request: &ArmRequest) -> Result<(), MonitorError> {
        info!(
            "Arm {} at ({:.5}, {:.5}) radius {} m",
            request.place_id, request.latitude, request.longitude, request.radius_m
        );
        Ok(())
    }

    async fn disarm(&self, place_id: &str) -> Result<(), MonitorError> {
        info!("Disarm {}", place_id);
        Ok(())
    }
}

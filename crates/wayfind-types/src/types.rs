//! Core types for place discovery.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::geo::haversine_distance;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// Latitude in degrees, -90..=90.
    pub latitude: f64,
    /// Longitude in degrees, -180..=180.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate without validation.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Examples
    ///
    /// ```
    /// use wayfind_types::Coordinate;
    ///
    /// assert!(Coordinate::try_new(40.0, -74.0).is_ok());
    /// assert!(Coordinate::try_new(91.0, 0.0).is_err());
    /// assert!(Coordinate::try_new(f64::NAN, 0.0).is_err());
    /// ```
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self::new(latitude, longitude);
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Check that both components are finite and within WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Validate the coordinate, returning an error describing it if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Great-circle distance to another coordinate in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(*self, *other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// A single position fix from the location source.
///
/// Consumed once per update and never persisted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// When the fix was taken. Defaults to "now" when absent from input.
    #[cfg_attr(
        feature = "serde",
        serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")
    )]
    pub timestamp: OffsetDateTime,
}

impl LocationSample {
    /// Create a sample stamped with the current time.
    #[must_use]
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A nearby named place returned by the place query service.
///
/// Lives from the query response until its trigger is armed or discarded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaceCandidate {
    /// Stable external identifier; doubles as the trigger id.
    pub place_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Place category, e.g. `city`, `town`, `village`.
    pub category: String,
}

impl PlaceCandidate {
    #[must_use]
    pub fn new(
        place_id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            place_id: place_id.into(),
            name: name.into(),
            latitude,
            longitude,
            category: category.into(),
        }
    }

    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Whether the candidate carries a usable (non-blank) name.
    #[must_use]
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Geofence transitions the engine asks the monitor to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransitionType {
    /// The device crossed into the region.
    Enter,
    /// The device stayed inside the region for the loitering delay.
    Dwell,
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionType::Enter => write!(f, "enter"),
            TransitionType::Dwell => write!(f, "dwell"),
        }
    }
}

/// An armed proximity trigger, one per place id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriggerRegistration {
    pub place_id: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    /// Delay before the first enter/dwell event is honored.
    pub loiter_delay_ms: u64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub armed_at: OffsetDateTime,
}

impl TriggerRegistration {
    /// Whether two registrations describe the same monitored region.
    ///
    /// `armed_at` is deliberately ignored: re-arming an identical region must
    /// not count as a change.
    #[must_use]
    pub fn same_region(&self, other: &TriggerRegistration) -> bool {
        self.place_id == other.place_id
            && self.center_lat == other.center_lat
            && self.center_lon == other.center_lon
            && self.radius_m == other.radius_m
            && self.loiter_delay_ms == other.loiter_delay_ms
    }

    /// Build the request handed to the platform trigger monitor.
    #[must_use]
    pub fn to_arm_request(&self) -> ArmRequest {
        ArmRequest {
            place_id: self.place_id.clone(),
            latitude: self.center_lat,
            longitude: self.center_lon,
            radius_m: self.radius_m,
            loiter_delay_ms: self.loiter_delay_ms,
            transition_types: vec![TransitionType::Enter, TransitionType::Dwell],
        }
    }
}

/// A durable registration together with the place data needed to resolve it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArmedPlace {
    pub place: PlaceCandidate,
    pub registration: TriggerRegistration,
}

impl ArmedPlace {
    /// Whether this entry is indistinguishable from `other` apart from `armed_at`.
    #[must_use]
    pub fn same_content(&self, other: &ArmedPlace) -> bool {
        self.place == other.place && self.registration.same_region(&other.registration)
    }
}

/// Request emitted to the platform geofence monitor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArmRequest {
    pub place_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
    pub loiter_delay_ms: u64,
    pub transition_types: Vec<TransitionType>,
}

impl ArmRequest {
    #[must_use]
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Whether a coordinate lies inside the requested region.
    #[must_use]
    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center().distance_to(point) <= self.radius_m
    }
}

/// A place the user has physically reached. Written at most once per place id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryRecord {
    pub place_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub discovered_at: OffsetDateTime,
}

impl DiscoveryRecord {
    /// Build a record for a resolved place.
    #[must_use]
    pub fn from_place(place: &PlaceCandidate, discovered_at: OffsetDateTime) -> Self {
        Self {
            place_id: place.place_id.clone(),
            name: place.name.clone(),
            latitude: place.latitude,
            longitude: place.longitude,
            category: place.category.clone(),
            discovered_at,
        }
    }
}

/// Result of durably recording an [`ArmedPlace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UpsertOutcome {
    /// No registration existed for the place id.
    Created,
    /// A registration existed with different content and was overwritten.
    Replaced,
    /// An identical registration already existed; nothing was written.
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the monitored region changed and must be (re)sent to the monitor.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

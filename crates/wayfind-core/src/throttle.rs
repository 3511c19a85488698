//! Movement-based gate for outbound place queries.
//!
//! Location samples arrive every few seconds, but nearby places only change
//! after a meaningful displacement. The throttle keeps the coordinate of the
//! last successful query (the anchor) and allows a new query only once the
//! user has moved further than the threshold from it.

use wayfind_types::Coordinate;

/// Default movement threshold in meters.
pub const DEFAULT_MOVE_THRESHOLD_M: f64 = 2_000.0;

/// Distance gate between successful place queries.
///
/// # Example
///
/// ```
/// use wayfind_core::FetchThrottle;
/// use wayfind_types::Coordinate;
///
/// let mut throttle = FetchThrottle::default();
/// let here = Coordinate::new(40.0, -74.0);
///
/// assert!(throttle.should_fetch(&here));
/// throttle.record_fetch(here);
/// assert!(!throttle.should_fetch(&Coordinate::new(40.0005, -74.0)));
/// ```
#[derive(Debug, Clone)]
pub struct FetchThrottle {
    threshold_m: f64,
    anchor: Option<Coordinate>,
}

impl Default for FetchThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MOVE_THRESHOLD_M)
    }
}

impl FetchThrottle {
    /// Create a throttle with no anchor.
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            anchor: None,
        }
    }

    /// Whether a query is warranted at `current`.
    ///
    /// Always true before the first recorded fetch. Afterwards, true only
    /// when the great-circle distance from the anchor exceeds the threshold.
    pub fn should_fetch(&self, current: &Coordinate) -> bool {
        match self.anchor {
            None => true,
            Some(anchor) => anchor.distance_to(current) > self.threshold_m,
        }
    }

    /// Move the anchor to `current`. Call only after a fetch succeeded.
    pub fn record_fetch(&mut self, current: Coordinate) {
        self.anchor = Some(current);
    }

    /// The coordinate of the last successful fetch, if any.
    pub fn anchor(&self) -> Option<Coordinate> {
        self.anchor
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }
}

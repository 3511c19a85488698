//! Great-circle geometry on a spherical Earth.

use crate::types::Coordinate;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two coordinates in meters.
///
/// Uses the haversine formula, which stays numerically stable for the short
/// distances the throttle and geofences deal with.
///
/// # Examples
///
/// ```
/// use wayfind_types::{Coordinate, geo::haversine_distance};
///
/// let a = Coordinate::new(0.0, 0.0);
/// let b = Coordinate::new(0.0, 1.0);
/// let d = haversine_distance(a, b);
/// assert!((d - 111_195.0).abs() < 10.0);
/// ```
#[must_use]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards against h drifting above 1.0 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_distance() {
        let p = Coordinate::new(40.0, -74.0);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_195.08).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_known_city_pair() {
        // New York City Hall to Philadelphia City Hall, roughly 130 km.
        let nyc = Coordinate::new(40.7128, -74.0060);
        let phl = Coordinate::new(39.9526, -75.1652);
        let d = haversine_distance(nyc, phl);
        assert!((125_000.0..135_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_antipodal_points() {
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    fn coordinate() -> impl Strategy<Value = Coordinate> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(a in coordinate(), b in coordinate()) {
            let ab = haversine_distance(a, b);
            let ba = haversine_distance(b, a);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn prop_distance_is_bounded(a in coordinate(), b in coordinate()) {
            let d = haversine_distance(a, b);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1e-6);
        }
    }
}

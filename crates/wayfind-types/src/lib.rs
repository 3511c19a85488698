//! Platform-agnostic types for the wayfind place discovery engine.
//!
//! This crate provides the data model shared by the engine (wayfind-core),
//! the durable store (wayfind-store), and the service.
//!
//! # Features
//!
//! - Location samples and coordinates with WGS84 validation
//! - Place candidates, trigger registrations, and arm requests
//! - Discovery records
//! - Great-circle distance
//!
//! # Example
//!
//! ```
//! use wayfind_types::{Coordinate, PlaceCandidate};
//!
//! let here = Coordinate::new(40.0, -74.0);
//! let place = PlaceCandidate::new("101", "Springfield", 40.01, -74.01, "town");
//! assert!(here.distance_to(&place.coordinate()) < 2_000.0);
//! ```

pub mod error;
pub mod geo;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ArmRequest, ArmedPlace, Coordinate, DiscoveryRecord, LocationSample, PlaceCandidate,
    TransitionType, TriggerRegistration, UpsertOutcome,
};

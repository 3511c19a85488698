//! Place discovery service: SQLite persistence, effects, and HTTP API.
//!
//! This crate runs the wayfind engine as a long-lived service that:
//! - Accepts location samples and fired triggers over HTTP or an NDJSON feed
//! - Queries OpenStreetMap (Overpass) for nearby places
//! - Persists armed triggers and discoveries in SQLite
//! - Shows a notification and plays a sound for each new discovery
//! - Streams discoveries to WebSocket clients
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Counts, fetch anchor, uptime
//! - `GET /api/discoveries` - Discoveries with filters and pagination
//! - `GET /api/discoveries/{id}` - One discovery
//! - `GET /api/stats` - Totals per category
//! - `GET /api/triggers` - Armed triggers
//! - `DELETE /api/triggers/{id}` - Disarm and forget a trigger
//! - `POST /api/triggers/fired` - Deliver fired trigger ids
//! - `POST /api/location` - Deliver a location sample
//! - `WS /api/ws` - Discovery snapshot, then live engine events
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/wayfind/service.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8787"
//!
//! [discovery]
//! move_threshold_m = 2000.0
//! trigger_radius_m = 500.0
//!
//! [effects]
//! sound_path = "/home/me/sounds/discovery.ogg"
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod feed;
pub mod monitor;
pub mod sinks;
pub mod state;
pub mod ws;

pub use backend::{SharedStore, SqliteBackend};
pub use config::{
    Config, ConfigError, DiscoveryConfig, EffectsConfig, OverpassConfig, ServerConfig,
    StorageConfig,
};
pub use monitor::{LoggingMonitor, ProximityMonitor};
pub use sinks::{NotificationSink, SoundSink};
pub use state::AppState;

//! Durable storage for discovered places and armed triggers.
//!
//! This crate provides SQLite-based storage for the wayfind engine:
//! the permanent discovery log and the trigger table used to resolve
//! fires after a restart.
//!
//! # Features
//!
//! - Exactly-once discovery inserts keyed by place id
//! - Trigger registrations that survive process restarts
//! - Query discoveries by category and time range, with pagination
//! - Summary statistics and CSV export
//!
//! # Example
//!
//! ```no_run
//! use wayfind_store::{DiscoveryQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let query = DiscoveryQuery::new().category("village").limit(10);
//! for record in store.query_discoveries(&query)? {
//!     println!("{} ({})", record.name, record.place_id);
//! }
//! # Ok::<(), wayfind_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{CategoryCount, DiscoveryStats};
pub use queries::DiscoveryQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/wayfind/discoveries.db`
/// - macOS: `~/Library/Application Support/wayfind/discoveries.db`
/// - Windows: `C:\Users\<user>\AppData\Local\wayfind\discoveries.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("wayfind")
        .join("discoveries.db")
}

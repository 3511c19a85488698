//! Data models for aggregated and exported data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Summary of everything discovered so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryStats {
    /// Total number of discovered places.
    pub total: u64,
    /// Discoveries per category, largest first.
    pub by_category: Vec<CategoryCount>,
    /// When the first place was discovered.
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_discovered_at: Option<OffsetDateTime>,
    /// When the most recent place was discovered.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_discovered_at: Option<OffsetDateTime>,
}

/// Number of discoveries in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// One row of the CSV export.
#[derive(Debug, Serialize)]
pub(crate) struct CsvRow<'a> {
    pub place_id: &'a str,
    pub name: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub category: &'a str,
    pub discovered_at: String,
}

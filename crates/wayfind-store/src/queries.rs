//! Query builder for discoveries.
//!
//! # Example
//!
//! ```
//! use wayfind_store::{Store, DiscoveryQuery};
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let last_week = OffsetDateTime::now_utc() - Duration::days(7);
//!
//! let query = DiscoveryQuery::new()
//!     .category("town")
//!     .since(last_week)
//!     .limit(20);
//!
//! let towns = store.query_discoveries(&query)?;
//! # Ok::<(), wayfind_store::Error>(())
//! ```

use time::OffsetDateTime;

use crate::store::to_millis;

/// Fluent query builder for discovered places.
///
/// By default, queries return results ordered by `discovered_at` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct DiscoveryQuery {
    /// Filter by category.
    pub category: Option<String>,
    /// Include only discoveries at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only discoveries at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by discovered_at descending (newest first).
    pub newest_first: bool,
}

impl DiscoveryQuery {
    /// Create a new query: no filters, no limit, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by category (exact match).
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Filter to discoveries made at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to discoveries made at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref category) = self.category {
            conditions.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("discovered_at >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("discovered_at <= ?");
            params.push(Box::new(to_millis(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT place_id, name, latitude, longitude, category, discovered_at \
             FROM discoveries {} ORDER BY discovered_at {}, rowid {}",
            where_clause, order, order
        );

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}

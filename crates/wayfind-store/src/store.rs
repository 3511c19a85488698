//! Main store implementation.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use wayfind_types::{
    ArmedPlace, DiscoveryRecord, PlaceCandidate, TriggerRegistration, UpsertOutcome,
};

use crate::error::{Error, Result};
use crate::models::{CategoryCount, CsvRow, DiscoveryStats};
use crate::queries::DiscoveryQuery;
use crate::schema;

/// How long a writer waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store for discoveries and armed triggers.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

pub(crate) fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn discovery_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveryRecord> {
    Ok(DiscoveryRecord {
        place_id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        category: row.get(4)?,
        discovered_at: from_millis(5, row.get(5)?)?,
    })
}

fn armed_place_from_row(row: &Row<'_>) -> rusqlite::Result<ArmedPlace> {
    let place_id: String = row.get(0)?;
    Ok(ArmedPlace {
        place: PlaceCandidate {
            place_id: place_id.clone(),
            name: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            category: row.get(4)?,
        },
        registration: TriggerRegistration {
            place_id,
            center_lat: row.get(5)?,
            center_lon: row.get(6)?,
            radius_m: row.get(7)?,
            loiter_delay_ms: row.get::<_, i64>(8)?.max(0) as u64,
            armed_at: from_millis(9, row.get(9)?)?,
        },
    })
}

const TRIGGER_COLUMNS: &str = "place_id, name, latitude, longitude, category, \
     center_lat, center_lon, radius_m, loiter_delay_ms, armed_at";

fn load_trigger(conn: &Connection, place_id: &str) -> Result<Option<ArmedPlace>> {
    let sql = format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE place_id = ?");
    let armed = conn
        .query_row(&sql, [place_id], armed_place_from_row)
        .optional()?;
    Ok(armed)
}

// Discovery operations
impl Store {
    /// Check whether a place has already been discovered.
    pub fn discovery_exists(&self, place_id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM discoveries WHERE place_id = ?)",
            [place_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Insert a discovery unless one already exists for the place id.
    ///
    /// Returns `true` only for the call that actually wrote the row; the
    /// primary key makes this an insert-or-ignore at the storage layer.
    pub fn insert_discovery(&self, record: &DiscoveryRecord) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO discoveries
             (place_id, name, latitude, longitude, category, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.place_id,
                record.name,
                record.latitude,
                record.longitude,
                record.category,
                to_millis(record.discovered_at),
            ],
        )?;

        if changed == 1 {
            info!("Recorded discovery of {} ({})", record.name, record.place_id);
        } else {
            debug!("Discovery of {} already recorded", record.place_id);
        }

        Ok(changed == 1)
    }

    /// Get a single discovery by place id.
    pub fn get_discovery(&self, place_id: &str) -> Result<Option<DiscoveryRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT place_id, name, latitude, longitude, category, discovered_at
                 FROM discoveries WHERE place_id = ?",
                [place_id],
                discovery_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All discoveries, newest first.
    pub fn list_discoveries(&self) -> Result<Vec<DiscoveryRecord>> {
        self.query_discoveries(&DiscoveryQuery::new())
    }

    /// Query discoveries with filters.
    pub fn query_discoveries(&self, query: &DiscoveryQuery) -> Result<Vec<DiscoveryRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), discovery_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count all discoveries.
    pub fn count_discoveries(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM discoveries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Aggregate statistics over all discoveries.
    pub fn discovery_stats(&self) -> Result<DiscoveryStats> {
        let (total, first, last): (i64, Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT COUNT(*), MIN(discovered_at), MAX(discovered_at) FROM discoveries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM discoveries
             GROUP BY category ORDER BY COUNT(*) DESC, category ASC",
        )?;
        let by_category = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DiscoveryStats {
            total: total as u64,
            by_category,
            first_discovered_at: first.map(|ms| from_millis(1, ms)).transpose()?,
            last_discovered_at: last.map(|ms| from_millis(2, ms)).transpose()?,
        })
    }

    /// Write all discoveries as CSV (oldest first). Returns the number of rows.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let records = self.query_discoveries(&DiscoveryQuery::new().oldest_first())?;
        let mut csv = csv::Writer::from_writer(writer);

        for record in &records {
            let discovered_at = record
                .discovered_at
                .format(&Rfc3339)
                .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
            csv.serialize(CsvRow {
                place_id: &record.place_id,
                name: &record.name,
                latitude: record.latitude,
                longitude: record.longitude,
                category: &record.category,
                discovered_at,
            })?;
        }

        csv.flush()?;
        Ok(records.len())
    }
}

// Trigger operations
impl Store {
    /// Durably record an armed trigger, keyed by place id.
    ///
    /// Last write wins. Writing content identical to the stored row (ignoring
    /// `armed_at`) leaves the row untouched and reports `Unchanged`.
    pub fn upsert_trigger(&self, armed: &ArmedPlace) -> Result<UpsertOutcome> {
        let registration = &armed.registration;
        let tx = self.conn.unchecked_transaction()?;

        let outcome = match load_trigger(&tx, &registration.place_id)? {
            Some(current) if current.same_content(armed) => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Created,
        };

        if outcome.is_changed() {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO triggers ({TRIGGER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                rusqlite::params![
                    registration.place_id,
                    armed.place.name,
                    armed.place.latitude,
                    armed.place.longitude,
                    armed.place.category,
                    registration.center_lat,
                    registration.center_lon,
                    registration.radius_m,
                    i64::try_from(registration.loiter_delay_ms).unwrap_or(i64::MAX),
                    to_millis(registration.armed_at),
                ],
            )?;
        }

        tx.commit()?;
        debug!("Trigger {} {:?}", registration.place_id, outcome);
        Ok(outcome)
    }

    /// Look up an armed trigger by place id.
    pub fn get_trigger(&self, place_id: &str) -> Result<Option<ArmedPlace>> {
        load_trigger(&self.conn, place_id)
    }

    /// All armed triggers, most recently armed first.
    pub fn list_triggers(&self) -> Result<Vec<ArmedPlace>> {
        let sql = format!("SELECT {TRIGGER_COLUMNS} FROM triggers ORDER BY armed_at DESC, rowid DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let triggers = stmt
            .query_map([], armed_place_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(triggers)
    }

    /// Remove an armed trigger. Returns whether a row was deleted.
    pub fn remove_trigger(&self, place_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM triggers WHERE place_id = ?", [place_id])?;
        Ok(changed > 0)
    }

    /// Count armed triggers.
    pub fn count_triggers(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM triggers", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(place_id: &str, name: &str, category: &str, at: OffsetDateTime) -> DiscoveryRecord {
        DiscoveryRecord {
            place_id: place_id.to_string(),
            name: name.to_string(),
            latitude: 40.01,
            longitude: -74.01,
            category: category.to_string(),
            discovered_at: at,
        }
    }

    fn armed(place_id: &str, lat: f64, lon: f64) -> ArmedPlace {
        ArmedPlace {
            place: PlaceCandidate::new(place_id, "Springfield", lat, lon, "town"),
            registration: TriggerRegistration {
                place_id: place_id.to_string(),
                center_lat: lat,
                center_lon: lon,
                radius_m: 500.0,
                loiter_delay_ms: 30_000,
                armed_at: datetime!(2026-03-01 12:00 UTC),
            },
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_discoveries().unwrap().is_empty());
        assert!(store.list_triggers().unwrap().is_empty());
    }

    #[test]
    fn test_insert_discovery_once() {
        let store = Store::open_in_memory().unwrap();
        let first = record("101", "Springfield", "town", datetime!(2026-03-01 12:00 UTC));

        assert!(!store.discovery_exists("101").unwrap());
        assert!(store.insert_discovery(&first).unwrap());
        assert!(store.discovery_exists("101").unwrap());

        // A second insert with different content is ignored, not applied.
        let mut second = first.clone();
        second.name = "Shelbyville".to_string();
        assert!(!store.insert_discovery(&second).unwrap());

        let stored = store.get_discovery("101").unwrap().unwrap();
        assert_eq!(stored.name, "Springfield");
        assert_eq!(store.count_discoveries().unwrap(), 1);
    }

    #[test]
    fn test_timestamp_round_trip_millis() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-03-01 12:34:56.789 UTC);
        store.insert_discovery(&record("1", "A", "town", at)).unwrap();
        let stored = store.get_discovery("1").unwrap().unwrap();
        assert_eq!(stored.discovered_at, at);
    }

    #[test]
    fn test_list_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_discovery(&record("1", "Old", "town", datetime!(2026-01-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("2", "New", "city", datetime!(2026-02-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("3", "Mid", "village", datetime!(2026-01-15 0:00 UTC)))
            .unwrap();

        let names: Vec<_> = store
            .list_discoveries()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["New", "Mid", "Old"]);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-01-01 0:00 UTC);
        store.insert_discovery(&record("a", "First", "town", at)).unwrap();
        store.insert_discovery(&record("b", "Second", "town", at)).unwrap();

        let listed = store.list_discoveries().unwrap();
        assert_eq!(listed[0].place_id, "b");
        assert_eq!(listed[1].place_id, "a");
    }

    #[test]
    fn test_query_by_category_and_range() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_discovery(&record("1", "A", "town", datetime!(2026-01-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("2", "B", "town", datetime!(2026-02-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("3", "C", "city", datetime!(2026-02-02 0:00 UTC)))
            .unwrap();

        let towns = store
            .query_discoveries(&DiscoveryQuery::new().category("town"))
            .unwrap();
        assert_eq!(towns.len(), 2);

        let recent = store
            .query_discoveries(&DiscoveryQuery::new().since(datetime!(2026-01-15 0:00 UTC)))
            .unwrap();
        assert_eq!(recent.len(), 2);

        let page = store
            .query_discoveries(&DiscoveryQuery::new().limit(1).offset(1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].place_id, "2");
    }

    #[test]
    fn test_discovery_stats() {
        let store = Store::open_in_memory().unwrap();
        let empty = store.discovery_stats().unwrap();
        assert_eq!(empty.total, 0);
        assert!(empty.first_discovered_at.is_none());

        store
            .insert_discovery(&record("1", "A", "town", datetime!(2026-01-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("2", "B", "town", datetime!(2026-02-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("3", "C", "city", datetime!(2026-03-01 0:00 UTC)))
            .unwrap();

        let stats = store.discovery_stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(
            stats.by_category[0],
            CategoryCount {
                category: "town".to_string(),
                count: 2
            }
        );
        assert_eq!(stats.first_discovered_at, Some(datetime!(2026-01-01 0:00 UTC)));
        assert_eq!(stats.last_discovered_at, Some(datetime!(2026-03-01 0:00 UTC)));
    }

    #[test]
    fn test_export_csv() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_discovery(&record("2", "Later", "city", datetime!(2026-02-01 0:00 UTC)))
            .unwrap();
        store
            .insert_discovery(&record("1", "Earlier", "town", datetime!(2026-01-01 0:00 UTC)))
            .unwrap();

        let mut out = Vec::new();
        let rows = store.export_csv(&mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "place_id,name,latitude,longitude,category,discovered_at"
        );
        assert!(lines[1].starts_with("1,Earlier,"));
        assert!(lines[2].starts_with("2,Later,"));
    }

    #[test]
    fn test_upsert_trigger_outcomes() {
        let store = Store::open_in_memory().unwrap();
        let first = armed("101", 40.01, -74.01);

        assert_eq!(store.upsert_trigger(&first).unwrap(), UpsertOutcome::Created);

        // Same region, later arm time: nothing changes.
        let mut again = first.clone();
        again.registration.armed_at = datetime!(2026-03-02 12:00 UTC);
        assert_eq!(store.upsert_trigger(&again).unwrap(), UpsertOutcome::Unchanged);
        let stored = store.get_trigger("101").unwrap().unwrap();
        assert_eq!(stored.registration.armed_at, first.registration.armed_at);

        // Moved center: replaced in place.
        let moved = armed("101", 40.02, -74.02);
        assert_eq!(store.upsert_trigger(&moved).unwrap(), UpsertOutcome::Replaced);
        let stored = store.get_trigger("101").unwrap().unwrap();
        assert_eq!(stored.registration.center_lat, 40.02);
        assert_eq!(store.count_triggers().unwrap(), 1);
    }

    #[test]
    fn test_trigger_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let entry = armed("101", 40.01, -74.01);
        store.upsert_trigger(&entry).unwrap();

        let loaded = store.get_trigger("101").unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(store.get_trigger("999").unwrap().is_none());
    }

    #[test]
    fn test_remove_trigger() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_trigger(&armed("101", 40.01, -74.01)).unwrap();

        assert!(store.remove_trigger("101").unwrap());
        assert!(!store.remove_trigger("101").unwrap());
        assert!(store.get_trigger("101").unwrap().is_none());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wayfind.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .insert_discovery(&record("101", "Springfield", "town", datetime!(2026-03-01 0:00 UTC)))
                .unwrap();
            store.upsert_trigger(&armed("202", 41.0, -73.0)).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert!(store.discovery_exists("101").unwrap());
        assert!(store.get_trigger("202").unwrap().is_some());
    }
}

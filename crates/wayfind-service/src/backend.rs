//! SQLite adapters for the engine's storage traits.
//!
//! One [`Store`] backs both the discovery log and the trigger table. It is
//! shared behind a Tokio mutex by the engine, the API handlers, and the
//! WebSocket snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use wayfind_core::{DiscoveryStore, StorageResult, TriggerStore};
use wayfind_store::Store;
use wayfind_types::{ArmedPlace, DiscoveryRecord, UpsertOutcome};

/// A store shared across tasks.
pub type SharedStore = Arc<Mutex<Store>>;

/// Wrap a store for sharing.
pub fn shared(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// [`DiscoveryStore`] and [`TriggerStore`] over SQLite.
#[derive(Clone)]
pub struct SqliteBackend {
    store: SharedStore,
}

impl SqliteBackend {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DiscoveryStore for SqliteBackend {
    async fn exists(&self, place_id: &str) -> StorageResult<bool> {
        Ok(self.store.lock().await.discovery_exists(place_id)?)
    }

    async fn insert_if_absent(&self, record: &DiscoveryRecord) -> StorageResult<bool> {
        Ok(self.store.lock().await.insert_discovery(record)?)
    }

    async fn list_all(&self) -> StorageResult<Vec<DiscoveryRecord>> {
        Ok(self.store.lock().await.list_discoveries()?)
    }
}

#[async_trait]
impl TriggerStore for SqliteBackend {
    async fn upsert(&self, armed: &ArmedPlace) -> StorageResult<UpsertOutcome> {
        Ok(self.store.lock().await.upsert_trigger(armed)?)
    }

    async fn get(&self, place_id: &str) -> StorageResult<Option<ArmedPlace>> {
        Ok(self.store.lock().await.get_trigger(place_id)?)
    }

    async fn remove(&self, place_id: &str) -> StorageResult<bool> {
        Ok(self.store.lock().await.remove_trigger(place_id)?)
    }

    async fn list(&self) -> StorageResult<Vec<ArmedPlace>> {
        Ok(self.store.lock().await.list_triggers()?)
    }
}

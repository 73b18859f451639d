use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{CACHE_PREFIX, ContentQuery};
use crate::store::{KvStore, SyncError};

/// Last successfully fetched remote payload for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContentEntry {
    pub fetched_at: DateTime<Utc>,
    pub payload: Value,
}

/// Resolver cache over the `learn_cache_*` namespace. Entries are overwritten
/// on every successful fetch and never expire.
#[derive(Clone, Copy)]
pub struct ContentCache<'s> {
    store: &'s KvStore,
}

impl<'s> ContentCache<'s> {
    pub fn new(store: &'s KvStore) -> Self {
        Self { store }
    }

    pub fn get(&self, query: &ContentQuery) -> Result<Option<CachedContentEntry>, SyncError> {
        self.store.get(&query.cache_key())
    }

    pub fn put(&self, query: &ContentQuery, payload: &Value) -> Result<(), SyncError> {
        let entry = CachedContentEntry {
            fetched_at: Utc::now(),
            payload: payload.clone(),
        };
        self.store.put(&query.cache_key(), &entry)
    }

    pub fn keys(&self) -> Result<Vec<String>, SyncError> {
        self.store.keys_with_prefix(CACHE_PREFIX)
    }
}

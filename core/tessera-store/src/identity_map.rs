//! The identity map: one record instance per identifier.

use std::collections::HashMap;
use std::sync::Arc;
use tessera_model::Record;
use tessera_types::{ClientId, RecordKey};

/// Records indexed by client id, by `(type, id)` once they have an id, and
/// per type in the order they were added.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    by_client_id: HashMap<ClientId, Arc<Record>>,
    by_key: HashMap<RecordKey, ClientId>,
    by_type: HashMap<String, Vec<ClientId>>,
}

impl IdentityMap {
    pub fn get(&self, key: &RecordKey) -> Option<&Arc<Record>> {
        self.by_key
            .get(key)
            .and_then(|client_id| self.by_client_id.get(client_id))
    }

    pub fn insert(&mut self, record: Arc<Record>) {
        let client_id = record.client_id();
        if let Some(key) = record.key() {
            self.by_key.insert(key, client_id);
        }
        self.by_type
            .entry(record.type_name().to_string())
            .or_default()
            .push(client_id);
        self.by_client_id.insert(client_id, record);
    }

    /// Indexes a record under the id it acquired after being added.
    /// Whatever was held under that key is evicted, so callers check first
    /// that it is only an empty or deleted placeholder.
    pub fn assign_key(&mut self, record: &Record) {
        let Some(key) = record.key() else {
            return;
        };
        let client_id = record.client_id();
        if let Some(previous) = self.by_key.insert(key.clone(), client_id) {
            if previous != client_id {
                self.by_client_id.remove(&previous);
                if let Some(ids) = self.by_type.get_mut(&key.type_name) {
                    ids.retain(|id| *id != previous);
                }
            }
        }
    }

    pub fn remove(&mut self, record: &Record) {
        let client_id = record.client_id();
        if self.by_client_id.remove(&client_id).is_none() {
            return;
        }
        if let Some(key) = record.key() {
            if self.by_key.get(&key) == Some(&client_id) {
                self.by_key.remove(&key);
            }
        }
        if let Some(ids) = self.by_type.get_mut(record.type_name()) {
            ids.retain(|id| *id != client_id);
        }
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.by_client_id.contains_key(&record.client_id())
    }

    pub fn records_of_type(&self, type_name: &str) -> Vec<Arc<Record>> {
        self.by_type
            .get(type_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.by_client_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

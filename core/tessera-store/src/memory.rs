//! In-memory fixture adapter.
//!
//! Serves records from fixtures held in memory. Used by the command-line
//! tool and handy for tests that want realistic adapter behaviour without
//! scripting each call.

use crate::adapter::{Adapter, AdapterError, AdapterResult};
use crate::error::{StoreError, StoreResult};
use crate::record_array::RecordArray;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tessera_model::{EntityType, RelationshipDef, Snapshot};
use tessera_types::coerce_id;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Fixture {
    id: String,
    payload: Value,
}

/// Adapter backed by in-memory fixtures.
///
/// Fixtures are kept per type in insertion order. Links map a link string
/// to the ids it resolves to.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    fixtures: RwLock<HashMap<String, Vec<Fixture>>>,
    links: RwLock<HashMap<String, Vec<String>>>,
    latency: Option<Duration>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every adapter call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builds an adapter from a JSON object mapping type names to arrays of
    /// payloads. An optional `links` key maps link strings to id arrays.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        let adapter = Self::new();
        adapter.load_json(value)?;
        Ok(adapter)
    }

    pub fn load_json(&self, value: &Value) -> StoreResult<()> {
        let Some(object) = value.as_object() else {
            return Err(StoreError::Adapter(AdapterError::failure(
                "fixtures must be a JSON object",
            )));
        };
        for (key, entries) in object {
            if key == "links" {
                self.load_links(entries)?;
                continue;
            }
            let Some(payloads) = entries.as_array() else {
                return Err(StoreError::Adapter(AdapterError::failure(format!(
                    "fixtures for '{key}' must be an array"
                ))));
            };
            for payload in payloads {
                self.insert(key, payload.clone())?;
            }
        }
        Ok(())
    }

    fn load_links(&self, value: &Value) -> StoreResult<()> {
        let Some(links) = value.as_object() else {
            return Err(StoreError::Adapter(AdapterError::failure(
                "`links` must be an object",
            )));
        };
        for (link, ids) in links {
            let ids = ids
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .map(coerce_id)
                .collect::<Result<Vec<_>, _>>()
                .map_err(tessera_model::ModelError::from)?;
            self.add_link(link, ids);
        }
        Ok(())
    }

    /// Adds or replaces a fixture. Returns its id.
    pub fn insert(&self, type_name: &str, payload: Value) -> StoreResult<String> {
        let id = match payload.get("id") {
            Some(id) if !id.is_null() => coerce_id(id).map_err(tessera_model::ModelError::from)?,
            _ => {
                return Err(StoreError::MissingId {
                    type_name: type_name.to_string(),
                })
            }
        };
        let mut fixtures = self.fixtures.write().unwrap_or_else(|e| e.into_inner());
        let entries = fixtures.entry(type_name.to_string()).or_default();
        match entries.iter_mut().find(|f| f.id == id) {
            Some(existing) => existing.payload = payload,
            None => entries.push(Fixture {
                id: id.clone(),
                payload,
            }),
        }
        Ok(id)
    }

    /// Registers the ids a link resolves to.
    pub fn add_link(&self, link: impl Into<String>, ids: Vec<String>) {
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(link.into(), ids);
    }

    pub fn get(&self, type_name: &str, id: &str) -> Option<Value> {
        self.fixtures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(type_name)
            .and_then(|entries| entries.iter().find(|f| f.id == id))
            .map(|f| f.payload.clone())
    }

    /// Every fixture of a type, in insertion order.
    pub fn fixtures(&self, type_name: &str) -> Vec<Value> {
        self.fixtures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(type_name)
            .map(|entries| entries.iter().map(|f| f.payload.clone()).collect())
            .unwrap_or_default()
    }

    fn remove(&self, type_name: &str, id: &str) -> bool {
        let mut fixtures = self.fixtures.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = fixtures.get_mut(type_name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|f| f.id != id);
        entries.len() != before
    }

    fn resolve_link(&self, link: &str) -> AdapterResult<Vec<String>> {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(link)
            .cloned()
            .ok_or(AdapterError::NotFound)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn matches_query(payload: &Value, query: &Map<String, Value>) -> bool {
    query
        .iter()
        .all(|(field, expected)| payload.get(field) == Some(expected))
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn find(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        id: &str,
        _snapshot: &Snapshot,
    ) -> AdapterResult<Value> {
        self.pause().await;
        self.get(&entity_type.name, id).ok_or(AdapterError::NotFound)
    }

    async fn find_many(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        ids: &[String],
        _snapshots: &[Snapshot],
    ) -> AdapterResult<Vec<Value>> {
        self.pause().await;
        Ok(ids
            .iter()
            .filter_map(|id| self.get(&entity_type.name, id))
            .collect())
    }

    async fn find_query(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        query: &Value,
        _records: &RecordArray,
    ) -> AdapterResult<Vec<Value>> {
        self.pause().await;
        let Some(query) = query.as_object() else {
            return Err(AdapterError::failure("query must be a JSON object"));
        };
        Ok(self
            .fixtures(&entity_type.name)
            .into_iter()
            .filter(|payload| matches_query(payload, query))
            .collect())
    }

    async fn find_all(&self, _store: &Store, entity_type: &EntityType) -> AdapterResult<Vec<Value>> {
        self.pause().await;
        Ok(self.fixtures(&entity_type.name))
    }

    async fn find_has_many(
        &self,
        _store: &Store,
        _snapshot: &Snapshot,
        link: &str,
        relationship: &RelationshipDef,
    ) -> AdapterResult<Vec<Value>> {
        self.pause().await;
        let ids = self.resolve_link(link)?;
        Ok(ids
            .iter()
            .filter_map(|id| self.get(&relationship.target_type, id))
            .collect())
    }

    async fn find_belongs_to(
        &self,
        _store: &Store,
        _snapshot: &Snapshot,
        link: &str,
        relationship: &RelationshipDef,
    ) -> AdapterResult<Option<Value>> {
        self.pause().await;
        let ids = self.resolve_link(link)?;
        Ok(ids
            .first()
            .and_then(|id| self.get(&relationship.target_type, id)))
    }

    async fn create_record(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        snapshot: &Snapshot,
    ) -> AdapterResult<Option<Value>> {
        self.pause().await;
        let id = snapshot
            .id()
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        if self.get(&entity_type.name, &id).is_some() {
            return Err(AdapterError::failure(format!(
                "{}:{} already exists",
                entity_type.name, id
            )));
        }
        let mut payload = snapshot.to_json(false);
        if let Value::Object(fields) = &mut payload {
            fields.insert("id".into(), Value::String(id.clone()));
        }
        self.insert(&entity_type.name, payload.clone())
            .map_err(|err| AdapterError::failure(err.to_string()))?;
        debug!("Stored new {}:{}", entity_type.name, id);
        Ok(Some(payload))
    }

    async fn update_record(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        snapshot: &Snapshot,
    ) -> AdapterResult<Option<Value>> {
        self.pause().await;
        let Some(id) = snapshot.id() else {
            return Err(AdapterError::failure("cannot update a record without an id"));
        };
        if self.get(&entity_type.name, id).is_none() {
            return Err(AdapterError::NotFound);
        }
        self.insert(&entity_type.name, snapshot.to_json(true))
            .map_err(|err| AdapterError::failure(err.to_string()))?;
        Ok(None)
    }

    async fn delete_record(
        &self,
        _store: &Store,
        entity_type: &EntityType,
        snapshot: &Snapshot,
    ) -> AdapterResult<()> {
        self.pause().await;
        let Some(id) = snapshot.id() else {
            return Err(AdapterError::failure("cannot delete a record without an id"));
        };
        if self.remove(&entity_type.name, id) {
            Ok(())
        } else {
            Err(AdapterError::NotFound)
        }
    }
}

//! The store: identity map, adapter dispatch and record lifecycle.
//!
//! The store owns no I/O of its own. It decides when to call the adapter,
//! drives records through their state machine around each call, and keeps
//! exactly one record instance per `(type, id)`.

use crate::adapter::{Adapter, AdapterError, AdapterOp, AdapterResult};
use crate::error::{StoreError, StoreResult};
use crate::identity_map::IdentityMap;
use crate::record_array::{LiveRecordArray, RecordArray};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tessera_model::{DeletedPhase, EntityType, Record, RecordState, ResourceData};
use tessera_types::{ClientId, RecordKey};
use tracing::{debug, info, warn};

/// Configuration for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name used in log output.
    pub name: String,
    /// Batch lookups of unloaded related records into `find_many` calls,
    /// even if the adapter does not ask for it.
    pub coalesce_find_requests: bool,
    /// Maximum ids per `find_many` call.
    pub batch_size: usize,
    /// Timeout for each adapter call (ms).
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "tessera".to_string(),
            coalesce_find_requests: false,
            batch_size: 100,
            timeout_ms: 30_000,
        }
    }
}

pub(crate) type SharedFind = Shared<BoxFuture<'static, StoreResult<Arc<Record>>>>;
pub(crate) type SharedTask = Shared<BoxFuture<'static, StoreResult<()>>>;

/// Handle to an entity store.
///
/// Cloning is cheap; clones share the same identity map and adapter.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) adapter: Arc<dyn Adapter>,
    types: RwLock<HashMap<String, Arc<EntityType>>>,
    records: Mutex<IdentityMap>,
    /// Outstanding single-record fetches, keyed by the record they load.
    pub(crate) pending_finds: Mutex<HashMap<RecordKey, SharedFind>>,
    /// Outstanding link fetches, keyed by owner, relationship and link.
    pub(crate) pending_links: Mutex<HashMap<(ClientId, String, String), SharedTask>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `type:id`, or the type and client id for records without an id.
pub(crate) fn label(record: &Record) -> String {
    match record.id() {
        Some(id) => format!("{}:{}", record.type_name(), id),
        None => format!("{} (client {})", record.type_name(), record.client_id()),
    }
}

impl Store {
    /// Creates a store with the default configuration.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::with_config(adapter, StoreConfig::default())
    }

    pub fn with_config(adapter: Arc<dyn Adapter>, config: StoreConfig) -> Self {
        debug!("Creating store '{}'", config.name);
        Self {
            inner: Arc::new(StoreInner {
                config,
                adapter,
                types: RwLock::new(HashMap::new()),
                records: Mutex::new(IdentityMap::default()),
                pending_finds: Mutex::new(HashMap::new()),
                pending_links: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.inner.adapter
    }

    // ── Schema ───────────────────────────────────────────────────

    /// Registers an entity type, replacing any previous definition of the
    /// same name. Records already materialized keep the old definition.
    pub fn define(&self, entity_type: EntityType) -> Arc<EntityType> {
        let entity_type = Arc::new(entity_type);
        self.inner
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_type.name.clone(), entity_type.clone());
        debug!("Defined entity type {}", entity_type.name);
        entity_type
    }

    pub fn model_for(&self, type_name: &str) -> StoreResult<Arc<EntityType>> {
        self.inner
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))
    }

    // ── Identity map ─────────────────────────────────────────────

    fn records(&self) -> MutexGuard<'_, IdentityMap> {
        lock(&self.inner.records)
    }

    /// The canonical record for `id`, materializing an empty one if needed.
    /// A record whose deletion is final is replaced.
    pub(crate) fn record_for_id(&self, entity_type: &Arc<EntityType>, id: &str) -> Arc<Record> {
        let key = RecordKey::new(&entity_type.name, id);
        let mut records = self.records();
        if let Some(existing) = records.get(&key).cloned() {
            if existing.state() != RecordState::Deleted(DeletedPhase::Saved) {
                return existing;
            }
            records.remove(&existing);
        }
        let record = Arc::new(Record::empty(entity_type.clone(), id));
        records.insert(record.clone());
        record
    }

    pub(crate) fn records_of_type(&self, type_name: &str) -> Vec<Arc<Record>> {
        self.records().records_of_type(type_name)
    }

    /// The loaded record for `id`, without contacting the adapter.
    pub fn peek(&self, type_name: &str, id: &str) -> Option<Arc<Record>> {
        let key = RecordKey::new(type_name, id);
        self.records()
            .get(&key)
            .filter(|record| {
                let state = record.state();
                state.is_loaded() && state != RecordState::Deleted(DeletedPhase::Saved)
            })
            .cloned()
    }

    pub fn has_record_for_id(&self, type_name: &str, id: &str) -> bool {
        self.peek(type_name, id).is_some()
    }

    /// Whether the record is the one the identity map holds.
    pub fn is_tracked(&self, record: &Record) -> bool {
        self.records().contains(record)
    }

    /// Every loaded, non-deleted record of a type, kept current.
    pub fn all(&self, type_name: &str) -> StoreResult<LiveRecordArray> {
        self.model_for(type_name)?;
        Ok(LiveRecordArray::new(self.clone(), type_name))
    }

    // ── Push ─────────────────────────────────────────────────────

    /// Merges a payload into the canonical record for its id.
    pub fn push(&self, type_name: &str, payload: &Value) -> StoreResult<Arc<Record>> {
        let entity_type = self.model_for(type_name)?;
        self.push_payload(&entity_type, payload)
    }

    pub fn push_many(&self, type_name: &str, payloads: &[Value]) -> StoreResult<Vec<Arc<Record>>> {
        let entity_type = self.model_for(type_name)?;
        self.push_all(&entity_type, payloads)
    }

    pub(crate) fn push_all(
        &self,
        entity_type: &Arc<EntityType>,
        payloads: &[Value],
    ) -> StoreResult<Vec<Arc<Record>>> {
        payloads
            .iter()
            .map(|payload| self.push_payload(entity_type, payload))
            .collect()
    }

    pub(crate) fn push_payload(
        &self,
        entity_type: &Arc<EntityType>,
        payload: &Value,
    ) -> StoreResult<Arc<Record>> {
        let data = ResourceData::from_json(entity_type, payload)?;
        let Some(id) = data.id.as_deref() else {
            return Err(StoreError::MissingId {
                type_name: entity_type.name.clone(),
            });
        };
        self.push_data(entity_type, id, &data)
    }

    fn push_data(
        &self,
        entity_type: &Arc<EntityType>,
        id: &str,
        data: &ResourceData,
    ) -> StoreResult<Arc<Record>> {
        let record = self.record_for_id(entity_type, id);
        record.push_data(data)?;
        debug!("Pushed {}:{} ({})", entity_type.name, id, record.state());
        Ok(record)
    }

    // ── Find ─────────────────────────────────────────────────────

    /// Returns the record for `id`, fetching it if it is not loaded.
    ///
    /// Concurrent calls for the same id share one adapter call.
    pub async fn find(&self, type_name: &str, id: &str) -> StoreResult<Arc<Record>> {
        let entity_type = self.model_for(type_name)?;
        let record = self.record_for_id(&entity_type, id);
        if record.is_loaded() {
            debug!("Identity map hit for {}:{}", type_name, id);
            return Ok(record);
        }
        self.fetch(&entity_type, record)?.await
    }

    /// The in-flight fetch for a record, started if there is none.
    pub(crate) fn fetch(
        &self,
        entity_type: &Arc<EntityType>,
        record: Arc<Record>,
    ) -> StoreResult<SharedFind> {
        let key = record.key().ok_or_else(|| StoreError::MissingId {
            type_name: entity_type.name.clone(),
        })?;

        let mut pending = lock(&self.inner.pending_finds);
        if let Some(existing) = pending.get(&key) {
            debug!("Joining in-flight find for {}", key);
            return Ok(existing.clone());
        }
        if record.is_empty() {
            record.loading_data()?;
        }

        let store = self.clone();
        let entity_type = entity_type.clone();
        let pending_key = key.clone();
        let future = async move {
            let result = store.run_find(&entity_type, &record, &key).await;
            lock(&store.inner.pending_finds).remove(&key);
            result
        }
        .boxed()
        .shared();
        pending.insert(pending_key, future.clone());
        Ok(future)
    }

    async fn run_find(
        &self,
        entity_type: &Arc<EntityType>,
        record: &Arc<Record>,
        key: &RecordKey,
    ) -> StoreResult<Arc<Record>> {
        let snapshot = record.snapshot();
        debug!("Dispatching find for {}", key);
        let result = self
            .dispatch(
                AdapterOp::Find,
                self.inner.adapter.find(self, entity_type, &key.id, &snapshot),
            )
            .await
            .and_then(|payload| self.push_found(entity_type, &key.id, &payload));

        match result {
            Ok(found) => Ok(found),
            Err(StoreError::Adapter(AdapterError::NotFound)) => {
                warn!("{} not found", key);
                self.abandon_load(record);
                Err(StoreError::NotFound(key.clone()))
            }
            Err(err) => {
                warn!("Find for {} failed: {}", key, err);
                self.abandon_load(record);
                Err(err)
            }
        }
    }

    /// Pushes the answer to a fetch for `id`. A payload without an id is
    /// taken to be the requested record.
    fn push_found(
        &self,
        entity_type: &Arc<EntityType>,
        id: &str,
        payload: &Value,
    ) -> StoreResult<Arc<Record>> {
        let mut data = ResourceData::from_json(entity_type, payload)?;
        if let Some(returned) = data.id.as_deref() {
            if returned != id {
                return Err(StoreError::IdMismatch {
                    requested: RecordKey::new(&entity_type.name, id),
                    returned: returned.to_string(),
                });
            }
        }
        data.id = Some(id.to_string());
        self.push_data(entity_type, id, &data)
    }

    /// Returns a record whose fetch failed to empty and drops it from the
    /// identity map. Records that received data in the meantime are kept.
    pub(crate) fn abandon_load(&self, record: &Arc<Record>) {
        if !record.is_loading() {
            return;
        }
        if let Err(err) = record.load_failed() {
            warn!("Could not reset {}: {}", label(record), err);
            return;
        }
        self.records().remove(record);
    }

    /// Runs a server query and loads the results into a new array.
    pub async fn find_query(&self, type_name: &str, query: Value) -> StoreResult<RecordArray> {
        let entity_type = self.model_for(type_name)?;
        let mut array = RecordArray::new(&entity_type.name, Some(query.clone()));
        debug!("Dispatching find_query for {}: {}", entity_type.name, query);
        let payloads = self
            .dispatch(
                AdapterOp::FindQuery,
                self.inner
                    .adapter
                    .find_query(self, &entity_type, &query, &array),
            )
            .await?;
        let records = self.push_all(&entity_type, &payloads)?;
        info!("Query for {} returned {} records", entity_type.name, records.len());
        array.load(records);
        Ok(array)
    }

    /// Loads every record of a type and returns the live collection.
    pub async fn find_all(&self, type_name: &str) -> StoreResult<LiveRecordArray> {
        let entity_type = self.model_for(type_name)?;
        debug!("Dispatching find_all for {}", entity_type.name);
        let payloads = self
            .dispatch(AdapterOp::FindAll, self.inner.adapter.find_all(self, &entity_type))
            .await?;
        self.push_all(&entity_type, &payloads)?;
        self.all(type_name)
    }

    /// A live collection of the records matching `predicate`, after running
    /// `query` against the server if one is given.
    pub async fn filter<F>(
        &self,
        type_name: &str,
        query: Option<Value>,
        predicate: F,
    ) -> StoreResult<LiveRecordArray>
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.model_for(type_name)?;
        if let Some(query) = query {
            self.find_query(type_name, query).await?;
        }
        Ok(LiveRecordArray::filtered(self.clone(), type_name, predicate))
    }

    // ── Create / save / delete ───────────────────────────────────

    /// Builds a new, unsaved record.
    ///
    /// The id comes from `properties`, else from the adapter's
    /// `generate_id_for_record`; without either the record is known only by
    /// its client id until it is saved.
    pub fn create_record(&self, type_name: &str, properties: &Value) -> StoreResult<Arc<Record>> {
        let entity_type = self.model_for(type_name)?;
        let mut data = ResourceData::from_properties(&entity_type, properties)?;
        if data.id.is_none() {
            data.id = self.inner.adapter.generate_id_for_record(self, &entity_type);
        }

        let mut records = self.records();
        if let Some(id) = &data.id {
            let key = RecordKey::new(&entity_type.name, id);
            if let Some(existing) = records.get(&key).cloned() {
                if !is_replaceable(&existing) {
                    return Err(StoreError::DuplicateId(key));
                }
                records.remove(&existing);
            }
        }
        let record = Arc::new(Record::created(entity_type, data));
        records.insert(record.clone());
        drop(records);

        debug!("Created {}", label(&record));
        Ok(record)
    }

    /// Persists a record: `create_record` for new records, `delete_record`
    /// for deleted ones, `update_record` otherwise.
    ///
    /// The record is in flight before the adapter is called. On success the
    /// record is returned; on failure the rejection is returned and the
    /// record moves to its invalid or error state.
    pub async fn save(&self, record: &Arc<Record>) -> StoreResult<Arc<Record>> {
        let state = record.state();
        if state == RecordState::Deleted(DeletedPhase::Saved) {
            debug!("{} is already deleted; nothing to save", label(record));
            return Ok(record.clone());
        }
        let op = match state {
            RecordState::Created(_) => AdapterOp::CreateRecord,
            RecordState::Deleted(_) => AdapterOp::DeleteRecord,
            _ => AdapterOp::UpdateRecord,
        };

        let snapshot = record.will_commit()?;
        let entity_type = record.entity_type().clone();
        let adapter = &self.inner.adapter;
        debug!("Dispatching {} for {}", op, label(record));

        let result = match op {
            AdapterOp::CreateRecord => {
                self.dispatch(op, adapter.create_record(self, &entity_type, &snapshot))
                    .await
            }
            AdapterOp::DeleteRecord => self
                .dispatch(op, adapter.delete_record(self, &entity_type, &snapshot))
                .await
                .map(|()| None),
            _ => {
                self.dispatch(op, adapter.update_record(self, &entity_type, &snapshot))
                    .await
            }
        };

        match result.and_then(|payload| self.commit_data(record, &entity_type, payload)) {
            Ok(data) => self.did_commit(record, op, data.as_ref()),
            Err(err) => self.did_fail(record, op, err),
        }
    }

    fn commit_data(
        &self,
        record: &Record,
        entity_type: &EntityType,
        payload: Option<Value>,
    ) -> StoreResult<Option<ResourceData>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let data = ResourceData::from_json(entity_type, &payload)?;
        if let (Some(current), Some(returned)) = (record.id(), data.id.as_deref()) {
            if current != returned {
                return Err(StoreError::IdMismatch {
                    requested: RecordKey::new(&entity_type.name, current),
                    returned: returned.to_string(),
                });
            }
        }
        Ok(Some(data))
    }

    fn did_commit(
        &self,
        record: &Arc<Record>,
        op: AdapterOp,
        data: Option<&ResourceData>,
    ) -> StoreResult<Arc<Record>> {
        let mut records = self.records();
        let assigned = record
            .id()
            .or_else(|| data.and_then(|data| data.id.clone()))
            .map(|id| RecordKey::new(record.type_name(), id));
        if let Some(key) = assigned {
            let taken = records
                .get(&key)
                .is_some_and(|other| !Arc::ptr_eq(other, record) && !is_replaceable(other));
            if taken {
                drop(records);
                return self.did_fail(record, op, StoreError::DuplicateId(key));
            }
        }
        record.adapter_did_commit(data)?;
        if record.state() == RecordState::Deleted(DeletedPhase::Saved) {
            records.remove(record);
        } else if record.id().is_some() {
            records.assign_key(record);
        } else {
            warn!(
                "{} committed without an id; it stays known by client id only",
                label(record)
            );
        }
        drop(records);

        info!("{} succeeded for {}", op, label(record));
        Ok(record.clone())
    }

    fn did_fail(
        &self,
        record: &Arc<Record>,
        op: AdapterOp,
        err: StoreError,
    ) -> StoreResult<Arc<Record>> {
        match &err {
            StoreError::Invalid(errors) => {
                warn!("{} for {} was rejected as invalid: {}", op, label(record), errors);
                record.adapter_did_invalidate(errors.clone())?;
            }
            other => {
                warn!("{} for {} failed: {}", op, label(record), other);
                record.adapter_did_error()?;
            }
        }
        Err(err)
    }

    /// Marks a record for deletion. A record that was never saved is
    /// discarded on the spot.
    pub fn delete_record(&self, record: &Arc<Record>) -> StoreResult<()> {
        record.delete_record()?;
        if record.state() == RecordState::Deleted(DeletedPhase::Saved) {
            self.records().remove(record);
            debug!("Discarded unsaved {}", label(record));
        }
        Ok(())
    }

    /// Discards a record's local edits and errors. A new record is discarded
    /// entirely.
    pub fn rollback(&self, record: &Arc<Record>) -> StoreResult<()> {
        record.rollback()?;
        if record.state() == RecordState::Deleted(DeletedPhase::Saved) {
            self.records().remove(record);
            debug!("Rolled back unsaved {}", label(record));
        }
        Ok(())
    }

    /// Deletes a record and saves the deletion.
    pub async fn destroy_record(&self, record: &Arc<Record>) -> StoreResult<Arc<Record>> {
        self.delete_record(record)?;
        self.save(record).await
    }

    // ── Unload ───────────────────────────────────────────────────

    /// Drops a clean record from the store. Dirty and in-flight records are
    /// refused.
    pub fn unload_record(&self, record: &Arc<Record>) -> StoreResult<()> {
        record.unload()?;
        self.records().remove(record);
        debug!("Unloaded {}", label(record));
        Ok(())
    }

    /// Drops every clean record of a type, leaving dirty and in-flight ones
    /// in place. Returns how many were dropped.
    pub fn unload_all(&self, type_name: &str) -> StoreResult<usize> {
        self.model_for(type_name)?;
        let mut unloaded = 0;
        for record in self.records_of_type(type_name) {
            match record.unload() {
                Ok(()) => {
                    self.records().remove(&record);
                    unloaded += 1;
                }
                Err(err) => debug!("Keeping {}: {}", label(&record), err),
            }
        }
        info!("Unloaded {} {} records", unloaded, type_name);
        Ok(unloaded)
    }

    // ── Adapter dispatch ─────────────────────────────────────────

    /// Awaits an adapter call under the configured timeout.
    pub(crate) async fn dispatch<T>(
        &self,
        op: AdapterOp,
        call: impl Future<Output = AdapterResult<T>>,
    ) -> StoreResult<T> {
        let timeout_ms = self.inner.config.timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                warn!("Adapter {} timed out after {}ms", op, timeout_ms);
                Err(StoreError::Timeout { op, timeout_ms })
            }
        }
    }
}

/// Whether a record held under an id may give way to another record claiming
/// the same id.
fn is_replaceable(record: &Record) -> bool {
    matches!(
        record.state(),
        RecordState::Empty | RecordState::Deleted(DeletedPhase::Saved)
    )
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

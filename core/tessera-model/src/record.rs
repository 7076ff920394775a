//! The record: one entity instance with its lifecycle and dirty tracking.
//!
//! Attribute values live in three layers. `data` is the last known server
//! state, `in_flight` holds the edits being saved, and `attributes` holds
//! local edits not yet sent. Reads see them in reverse order, then the
//! attribute default.

use crate::error::{ModelError, ModelResult};
use crate::errors::Errors;
use crate::resource::ResourceData;
use crate::schema::EntityType;
use crate::snapshot::{RelationshipData, Snapshot};
use crate::state::{DirtyPhase, RecordEvent, RecordState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tessera_types::{ClientId, RecordKey};

/// State of one relationship on a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipState {
    /// Ids known for the relationship; `None` until data arrives.
    pub data: Option<RelationshipData>,
    /// Server-provided link for fetching the relationship.
    pub link: Option<String>,
    /// Whether `link` has already been fetched.
    pub link_loaded: bool,
}

/// An attribute whose local value differs from the server's.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub old: Option<Value>,
    pub new: Value,
}

#[derive(Debug)]
struct RecordInner {
    id: Option<String>,
    state: RecordState,
    data: Map<String, Value>,
    in_flight: Map<String, Value>,
    attributes: Map<String, Value>,
    relationships: BTreeMap<String, RelationshipState>,
    errors: Errors,
    /// Set when a save fails; cleared only by a later successful save or a
    /// rollback, so it survives a retry that is still in flight.
    failed: bool,
}

/// A typed entity instance.
///
/// Records are shared as `Arc<Record>`; the store hands out the same `Arc`
/// for the same identifier, so `Arc::ptr_eq` is record identity.
#[derive(Debug)]
pub struct Record {
    client_id: ClientId,
    entity_type: Arc<EntityType>,
    inner: Mutex<RecordInner>,
}

impl Record {
    /// A record known only by id, waiting for data.
    pub fn empty(entity_type: Arc<EntityType>, id: impl Into<String>) -> Self {
        Self::with_state(entity_type, Some(id.into()), RecordState::Empty)
    }

    /// A new, unsaved record holding `properties` as local edits.
    pub fn created(entity_type: Arc<EntityType>, properties: ResourceData) -> Self {
        let record = Self::with_state(
            entity_type,
            properties.id,
            RecordState::Created(DirtyPhase::Uncommitted),
        );
        {
            let mut inner = record.lock();
            inner.attributes = properties.attributes;
            for (name, data) in properties.relationships {
                inner.relationships.entry(name).or_default().data = Some(data);
            }
        }
        record
    }

    fn with_state(entity_type: Arc<EntityType>, id: Option<String>, state: RecordState) -> Self {
        Self {
            client_id: ClientId::new(),
            entity_type,
            inner: Mutex::new(RecordInner {
                id,
                state,
                data: Map::new(),
                in_flight: Map::new(),
                attributes: Map::new(),
                relationships: BTreeMap::new(),
                errors: Errors::new(),
                failed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Identity ─────────────────────────────────────────────────

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn id(&self) -> Option<String> {
        self.lock().id.clone()
    }

    pub fn type_name(&self) -> &str {
        &self.entity_type.name
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// `(type, id)` key, once the record has an id.
    pub fn key(&self) -> Option<RecordKey> {
        self.id().map(|id| RecordKey::new(self.type_name(), id))
    }

    // ── Derived flags ────────────────────────────────────────────

    pub fn state(&self) -> RecordState {
        self.lock().state
    }

    pub fn is_empty(&self) -> bool {
        self.state().is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn is_loaded(&self) -> bool {
        self.state().is_loaded()
    }

    pub fn is_dirty(&self) -> bool {
        self.state().is_dirty()
    }

    pub fn is_new(&self) -> bool {
        self.state().is_new()
    }

    pub fn is_saving(&self) -> bool {
        self.state().is_saving()
    }

    pub fn is_deleted(&self) -> bool {
        self.state().is_deleted()
    }

    /// The last save failed and nothing has succeeded since.
    pub fn is_error(&self) -> bool {
        let inner = self.lock();
        inner.failed || inner.state.is_error()
    }

    /// True iff the record carries no validation errors.
    pub fn is_valid(&self) -> bool {
        self.lock().errors.is_empty()
    }

    pub fn errors(&self) -> Errors {
        self.lock().errors.clone()
    }

    // ── Attributes ───────────────────────────────────────────────

    /// Current value of an attribute.
    pub fn attr(&self, name: &str) -> Option<Value> {
        let inner = self.lock();
        inner
            .attributes
            .get(name)
            .or_else(|| inner.in_flight.get(name))
            .or_else(|| inner.data.get(name))
            .cloned()
            .or_else(|| {
                self.entity_type
                    .attribute(name)
                    .and_then(|a| a.default_value.clone())
            })
    }

    pub fn attr_str(&self, name: &str) -> Option<String> {
        self.attr(name).and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Sets an attribute locally.
    ///
    /// Setting an attribute back to its server value removes it from the
    /// dirty set. Validation errors for the attribute are dropped; when none
    /// remain, the record is valid again.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        if !self.entity_type.has_attribute(name) {
            return Err(ModelError::UnknownAttribute {
                type_name: self.entity_type.name.clone(),
                name: name.to_string(),
            });
        }
        let value = value.into();
        let mut inner = self.lock();
        let mut state = inner.state.apply(RecordEvent::BecomeDirty)?;

        let unchanged = inner.in_flight.get(name).or_else(|| inner.data.get(name)) == Some(&value);
        if unchanged {
            inner.attributes.remove(name);
        } else {
            inner.attributes.insert(name.to_string(), value);
        }

        if inner.errors.remove(name) && inner.errors.is_empty() && state.is_invalid() {
            state = state.apply(RecordEvent::BecameValid)?;
        }
        if inner.attributes.is_empty() && inner.in_flight.is_empty() {
            state = state.apply(RecordEvent::PropertyWasReset)?;
        }
        inner.state = state;
        Ok(())
    }

    /// Attributes edited locally, with their server values.
    pub fn changed_attributes(&self) -> BTreeMap<String, AttributeChange> {
        let inner = self.lock();
        inner
            .attributes
            .iter()
            .map(|(name, new)| {
                let old = inner.in_flight.get(name).or_else(|| inner.data.get(name)).cloned();
                (name.clone(), AttributeChange { old, new: new.clone() })
            })
            .collect()
    }

    // ── Relationships ────────────────────────────────────────────

    pub fn relationship(&self, name: &str) -> Option<RelationshipState> {
        self.lock().relationships.get(name).cloned()
    }

    /// Stores the result of fetching `link`. Ignored if the record has been
    /// pushed a different link in the meantime.
    pub fn resolve_link(&self, name: &str, link: &str, data: RelationshipData) {
        let mut inner = self.lock();
        let state = inner.relationships.entry(name.to_string()).or_default();
        if state.link.as_deref() == Some(link) {
            state.data = Some(data);
            state.link_loaded = true;
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    fn transition(inner: &mut RecordInner, event: RecordEvent) -> ModelResult<()> {
        inner.state = inner.state.apply(event)?;
        Ok(())
    }

    /// A fetch for the record's data has started.
    pub fn loading_data(&self) -> ModelResult<()> {
        Self::transition(&mut self.lock(), RecordEvent::LoadingData)
    }

    /// The fetch failed; the record is empty again.
    pub fn load_failed(&self) -> ModelResult<()> {
        Self::transition(&mut self.lock(), RecordEvent::LoadFailed)
    }

    /// Merges server data into the record.
    ///
    /// Attributes and relationships present in `data` replace the canonical
    /// ones; local edits that now match the server are dropped. A new link
    /// for a relationship marks it for fetching; the same link does not.
    pub fn push_data(&self, data: &ResourceData) -> ModelResult<()> {
        let mut inner = self.lock();
        let mut state = inner.state.apply(RecordEvent::PushedData)?;
        if inner.id.is_none() {
            inner.id = data.id.clone();
        }
        merge_server_data(&mut inner, data);

        let RecordInner { attributes, data: canonical, .. } = &mut *inner;
        attributes.retain(|name, value| canonical.get(name) != Some(value));
        if inner.attributes.is_empty() && inner.in_flight.is_empty() {
            state = state.apply(RecordEvent::PropertyWasReset)?;
        }
        inner.state = state;
        Ok(())
    }

    pub fn delete_record(&self) -> ModelResult<()> {
        Self::transition(&mut self.lock(), RecordEvent::DeleteRecord)
    }

    /// Discards local edits and validation errors.
    pub fn rollback(&self) -> ModelResult<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RecordEvent::Rollback)?;
        inner.attributes.clear();
        inner.errors.clear();
        inner.failed = false;
        Ok(())
    }

    /// Drops all data; the record becomes empty.
    pub fn unload(&self) -> ModelResult<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RecordEvent::Unload)?;
        inner.data.clear();
        inner.attributes.clear();
        inner.relationships.clear();
        inner.errors.clear();
        inner.failed = false;
        Ok(())
    }

    /// Starts a save: local edits move in flight and a snapshot of the
    /// record as it will be sent is returned.
    pub fn will_commit(&self) -> ModelResult<Snapshot> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RecordEvent::WillCommit)?;
        let pending = std::mem::take(&mut inner.attributes);
        inner.in_flight.extend(pending);
        Ok(self.snapshot_of(&inner))
    }

    /// The adapter acknowledged the save, optionally with updated data.
    pub fn adapter_did_commit(&self, data: Option<&ResourceData>) -> ModelResult<()> {
        let mut inner = self.lock();
        let mut state = inner.state.apply(RecordEvent::DidCommit)?;
        let committed = std::mem::take(&mut inner.in_flight);
        inner.data.extend(committed);
        if let Some(data) = data {
            if inner.id.is_none() {
                inner.id = data.id.clone();
            }
            merge_server_data(&mut inner, data);
        }
        inner.errors.clear();
        inner.failed = false;
        // Edits made while the save was in flight are still pending.
        if !inner.attributes.is_empty() && state == RecordState::Saved {
            state = state.apply(RecordEvent::BecomeDirty)?;
        }
        inner.state = state;
        Ok(())
    }

    /// The adapter rejected the save with validation errors.
    pub fn adapter_did_invalidate(&self, errors: Errors) -> ModelResult<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RecordEvent::BecameInvalid)?;
        restore_in_flight(&mut inner);
        // A rejected deletion has no attributes to fix, so it counts as failed.
        inner.failed |= inner.state.is_error();
        inner.errors = errors;
        Ok(())
    }

    /// The adapter failed the save for a reason other than validation.
    pub fn adapter_did_error(&self) -> ModelResult<()> {
        let mut inner = self.lock();
        Self::transition(&mut inner, RecordEvent::BecameError)?;
        restore_in_flight(&mut inner);
        inner.failed = true;
        Ok(())
    }

    // ── Snapshots ────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_of(&self.lock())
    }

    fn snapshot_of(&self, inner: &RecordInner) -> Snapshot {
        let attributes = self
            .entity_type
            .attributes
            .iter()
            .map(|def| {
                let value = inner
                    .attributes
                    .get(&def.name)
                    .or_else(|| inner.in_flight.get(&def.name))
                    .or_else(|| inner.data.get(&def.name))
                    .or(def.default_value.as_ref())
                    .cloned()
                    .unwrap_or(Value::Null);
                (def.name.clone(), value)
            })
            .collect();
        let relationships = inner
            .relationships
            .iter()
            .filter_map(|(name, state)| state.data.clone().map(|data| (name.clone(), data)))
            .collect();
        Snapshot::new(
            self.entity_type.name.clone(),
            inner.id.clone(),
            self.client_id,
            attributes,
            relationships,
        )
    }
}

fn merge_server_data(inner: &mut RecordInner, data: &ResourceData) {
    inner
        .data
        .extend(data.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (name, relationship) in &data.relationships {
        inner.relationships.entry(name.clone()).or_default().data = Some(relationship.clone());
    }
    for (name, link) in &data.links {
        let state = inner.relationships.entry(name.clone()).or_default();
        if state.link.as_deref() != Some(link.as_str()) {
            state.link = Some(link.clone());
            state.link_loaded = false;
        }
    }
}

/// Puts in-flight edits back in front of the server data. Edits made while
/// the save was in flight win over the ones that were sent.
fn restore_in_flight(inner: &mut RecordInner) {
    let mut restored = std::mem::take(&mut inner.in_flight);
    restored.extend(std::mem::take(&mut inner.attributes));
    inner.attributes = restored;
}

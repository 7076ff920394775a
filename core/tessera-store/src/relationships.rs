//! Relationship loading.
//!
//! Async relationships are resolved through the adapter: a link is
//! followed once per distinct value, and referenced records that are not
//! loaded are fetched, batched into `find_many` calls when coalescing is on.
//! Sync relationships never fetch.

use crate::adapter::AdapterOp;
use crate::error::{StoreError, StoreResult};
use crate::store::{label, lock, SharedTask, Store};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tessera_model::{
    EntityType, ModelError, Record, RelationshipData, RelationshipDef, RelationshipKind, Snapshot,
};
use tessera_types::{ClientId, RecordKey};
use tracing::{debug, warn};

impl Store {
    /// Resolves a has-many relationship to its records.
    pub async fn has_many(&self, record: &Arc<Record>, name: &str) -> StoreResult<Vec<Arc<Record>>> {
        let relationship = relationship_def(record, name, RelationshipKind::HasMany)?;
        let target = self.model_for(&relationship.target_type)?;
        if relationship.is_async {
            self.follow_link(record, &relationship).await?;
        }
        let ids = related_ids(record, name);
        if relationship.is_async {
            self.find_many_records(&target, &ids).await
        } else {
            self.loaded_references(record, &relationship, &ids)
        }
    }

    /// Resolves a belongs-to relationship to its record, if any.
    pub async fn belongs_to(&self, record: &Arc<Record>, name: &str) -> StoreResult<Option<Arc<Record>>> {
        let relationship = relationship_def(record, name, RelationshipKind::BelongsTo)?;
        self.model_for(&relationship.target_type)?;
        if relationship.is_async {
            self.follow_link(record, &relationship).await?;
        }
        let Some(id) = related_ids(record, name).into_iter().next() else {
            return Ok(None);
        };
        if relationship.is_async {
            self.find(&relationship.target_type, &id).await.map(Some)
        } else {
            let mut found = self.loaded_references(record, &relationship, &[id])?;
            Ok(found.pop())
        }
    }

    fn loaded_references(
        &self,
        record: &Record,
        relationship: &RelationshipDef,
        ids: &[String],
    ) -> StoreResult<Vec<Arc<Record>>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.peek(&relationship.target_type, id) {
                Some(related) => found.push(related),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::RelationshipNotLoaded {
                type_name: record.type_name().to_string(),
                name: relationship.name.clone(),
                ids: missing,
            });
        }
        Ok(found)
    }

    // ── Links ────────────────────────────────────────────────────

    /// Fetches the relationship's link unless that exact link has already
    /// been loaded. Concurrent callers share one fetch.
    async fn follow_link(&self, record: &Arc<Record>, relationship: &RelationshipDef) -> StoreResult<()> {
        let Some(state) = record.relationship(&relationship.name) else {
            return Ok(());
        };
        if state.link_loaded {
            return Ok(());
        }
        let Some(link) = state.link else {
            return Ok(());
        };

        let key = (record.client_id(), relationship.name.clone(), link.clone());
        let future = {
            let mut pending = lock(&self.inner.pending_links);
            if let Some(existing) = pending.get(&key) {
                debug!("Joining in-flight fetch of {} for {}", link, label(record));
                existing.clone()
            } else {
                let future = self.link_task(record.clone(), relationship.clone(), link, key.clone());
                pending.insert(key, future.clone());
                future
            }
        };
        future.await
    }

    fn link_task(
        &self,
        record: Arc<Record>,
        relationship: RelationshipDef,
        link: String,
        key: (ClientId, String, String),
    ) -> SharedTask {
        let store = self.clone();
        async move {
            let result = store.load_link(&record, &relationship, &link).await;
            lock(&store.inner.pending_links).remove(&key);
            result
        }
        .boxed()
        .shared()
    }

    async fn load_link(
        &self,
        record: &Arc<Record>,
        relationship: &RelationshipDef,
        link: &str,
    ) -> StoreResult<()> {
        let target = self.model_for(&relationship.target_type)?;
        let snapshot = record.snapshot();
        let adapter = &self.inner.adapter;
        debug!("Following {} link {} for {}", relationship.name, link, label(record));

        let data = match relationship.kind {
            RelationshipKind::HasMany => {
                let payloads = self
                    .dispatch(
                        AdapterOp::FindHasMany,
                        adapter.find_has_many(self, &snapshot, link, relationship),
                    )
                    .await?;
                let related = self.push_all(&target, &payloads)?;
                RelationshipData::HasMany(related.iter().filter_map(|r| r.id()).collect())
            }
            RelationshipKind::BelongsTo => {
                let payload = self
                    .dispatch(
                        AdapterOp::FindBelongsTo,
                        adapter.find_belongs_to(self, &snapshot, link, relationship),
                    )
                    .await?;
                let id = match payload {
                    Some(payload) => self.push_payload(&target, &payload)?.id(),
                    None => None,
                };
                RelationshipData::BelongsTo(id)
            }
        };
        record.resolve_link(&relationship.name, link, data);
        Ok(())
    }

    // ── Referenced records ───────────────────────────────────────

    /// The records for `ids`, fetching any that are not loaded.
    pub(crate) async fn find_many_records(
        &self,
        entity_type: &Arc<EntityType>,
        ids: &[String],
    ) -> StoreResult<Vec<Arc<Record>>> {
        let records: Vec<Arc<Record>> = ids
            .iter()
            .map(|id| self.record_for_id(entity_type, id))
            .collect();
        let unloaded: Vec<Arc<Record>> = records.iter().filter(|r| !r.is_loaded()).cloned().collect();
        if unloaded.is_empty() {
            return Ok(records);
        }

        let coalesce =
            self.inner.config.coalesce_find_requests || self.inner.adapter.coalesce_find_requests();
        let waits = if coalesce {
            self.fetch_coalesced(entity_type, unloaded)?
        } else {
            unloaded
                .into_iter()
                .map(|record| Ok(self.fetch(entity_type, record)?.map(|r| r.map(drop)).boxed()))
                .collect::<StoreResult<Vec<_>>>()?
        };
        try_join_all(waits).await?;
        Ok(records)
    }

    /// Starts `find_many` batches for records with no fetch in flight and
    /// joins the fetches of the rest.
    fn fetch_coalesced(
        &self,
        entity_type: &Arc<EntityType>,
        records: Vec<Arc<Record>>,
    ) -> StoreResult<Vec<BoxFuture<'static, StoreResult<()>>>> {
        let batch_size = self.inner.config.batch_size.max(1);
        let mut pending = lock(&self.inner.pending_finds);
        let mut waits = Vec::new();
        let mut fresh = Vec::new();
        for record in records {
            let Some(key) = record.key() else { continue };
            match pending.get(&key) {
                Some(existing) => waits.push(existing.clone().map(|r| r.map(drop)).boxed()),
                None => fresh.push((key, record)),
            }
        }

        for chunk in fresh.chunks(batch_size) {
            for (_, record) in chunk {
                if record.is_empty() {
                    record.loading_data()?;
                }
            }
            let batch = self.batch_task(entity_type, chunk.to_vec());
            for (key, record) in chunk {
                let record = record.clone();
                let missing = key.clone();
                let joined = batch
                    .clone()
                    .map(move |result| {
                        if record.is_loaded() {
                            Ok(record)
                        } else {
                            Err(result.err().unwrap_or(StoreError::NotFound(missing)))
                        }
                    })
                    .boxed()
                    .shared();
                pending.insert(key.clone(), joined);
            }
            waits.push(batch.boxed());
        }
        Ok(waits)
    }

    fn batch_task(&self, entity_type: &Arc<EntityType>, batch: Vec<(RecordKey, Arc<Record>)>) -> SharedTask {
        let store = self.clone();
        let entity_type = entity_type.clone();
        async move {
            let result = store.run_find_many(&entity_type, &batch).await;
            let mut pending = lock(&store.inner.pending_finds);
            for (key, _) in &batch {
                pending.remove(key);
            }
            drop(pending);
            result
        }
        .boxed()
        .shared()
    }

    async fn run_find_many(
        &self,
        entity_type: &Arc<EntityType>,
        batch: &[(RecordKey, Arc<Record>)],
    ) -> StoreResult<()> {
        let ids: Vec<String> = batch.iter().map(|(key, _)| key.id.clone()).collect();
        let snapshots: Vec<Snapshot> = batch.iter().map(|(_, record)| record.snapshot()).collect();
        debug!("Dispatching find_many for {} {:?}", entity_type.name, ids);

        let payloads = match self
            .dispatch(
                AdapterOp::FindMany,
                self.inner.adapter.find_many(self, entity_type, &ids, &snapshots),
            )
            .await
        {
            Ok(payloads) => payloads,
            Err(err) => {
                warn!("find_many for {} failed: {}", entity_type.name, err);
                for (_, record) in batch {
                    self.abandon_load(record);
                }
                return Err(err);
            }
        };

        let mut outcome = Ok(());
        for payload in &payloads {
            if let Err(err) = self.push_payload(entity_type, payload) {
                warn!("Dropping find_many payload for {}: {}", entity_type.name, err);
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        let missing: Vec<String> = batch
            .iter()
            .filter(|(_, record)| !record.is_loaded())
            .map(|(key, _)| key.id.clone())
            .collect();
        for (_, record) in batch {
            self.abandon_load(record);
        }
        outcome?;
        if !missing.is_empty() {
            warn!("find_many for {} did not return {:?}", entity_type.name, missing);
            return Err(StoreError::RecordsMissing {
                type_name: entity_type.name.clone(),
                ids: missing,
            });
        }
        Ok(())
    }
}

fn relationship_def(
    record: &Record,
    name: &str,
    kind: RelationshipKind,
) -> StoreResult<RelationshipDef> {
    record
        .entity_type()
        .relationship(name)
        .filter(|relationship| relationship.kind == kind)
        .cloned()
        .ok_or_else(|| {
            StoreError::Model(ModelError::UnknownRelationship {
                type_name: record.type_name().to_string(),
                name: name.to_string(),
            })
        })
}

fn related_ids(record: &Record, name: &str) -> Vec<String> {
    record
        .relationship(name)
        .and_then(|state| state.data)
        .map(|data| data.ids())
        .unwrap_or_default()
}

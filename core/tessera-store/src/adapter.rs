//! Adapter abstraction.
//!
//! An adapter is the store's only route to persistence. The store hands it
//! snapshots, never live records, and applies whatever it returns.

use crate::record_array::RecordArray;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tessera_model::{EntityType, Errors, RelationshipDef, Snapshot};
use thiserror::Error;

/// Result type for adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Ways an adapter call can be rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// The backend refused the data; messages are keyed by attribute.
    #[error("The backend rejected the commit because it was invalid: {0}")]
    Invalid(Errors),

    /// The backend has no such record.
    #[error("not found")]
    NotFound,

    /// Any other failure.
    #[error("{0}")]
    Failure(String),

    /// The adapter does not implement the operation.
    #[error("adapter does not implement {0}")]
    Unsupported(AdapterOp),
}

impl AdapterError {
    /// Shorthand for a validation rejection.
    pub fn invalid(errors: Errors) -> Self {
        AdapterError::Invalid(errors)
    }

    /// Shorthand for a generic failure.
    pub fn failure(message: impl Into<String>) -> Self {
        AdapterError::Failure(message.into())
    }
}

/// The operations an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterOp {
    Find,
    FindMany,
    FindQuery,
    FindAll,
    FindHasMany,
    FindBelongsTo,
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
}

impl AdapterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterOp::Find => "find",
            AdapterOp::FindMany => "find_many",
            AdapterOp::FindQuery => "find_query",
            AdapterOp::FindAll => "find_all",
            AdapterOp::FindHasMany => "find_has_many",
            AdapterOp::FindBelongsTo => "find_belongs_to",
            AdapterOp::CreateRecord => "create_record",
            AdapterOp::UpdateRecord => "update_record",
            AdapterOp::DeleteRecord => "delete_record",
        }
    }
}

impl fmt::Display for AdapterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persistence backend for the store.
///
/// Every method receives the store so that an adapter can push side-loaded
/// records while it works. Payloads are loosely shaped JSON objects which
/// the store normalizes against the entity type.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Fetches one record.
    async fn find(
        &self,
        store: &Store,
        entity_type: &EntityType,
        id: &str,
        snapshot: &Snapshot,
    ) -> AdapterResult<Value>;

    /// Fetches several records at once. `snapshots` line up with `ids`.
    ///
    /// Defaults to one [`Adapter::find`] per id.
    async fn find_many(
        &self,
        store: &Store,
        entity_type: &EntityType,
        ids: &[String],
        snapshots: &[Snapshot],
    ) -> AdapterResult<Vec<Value>> {
        let mut payloads = Vec::with_capacity(ids.len());
        for (id, snapshot) in ids.iter().zip(snapshots) {
            payloads.push(self.find(store, entity_type, id, snapshot).await?);
        }
        Ok(payloads)
    }

    /// Runs a server-side query. `records` is the (still empty) array the
    /// results will be loaded into.
    async fn find_query(
        &self,
        _store: &Store,
        _entity_type: &EntityType,
        _query: &Value,
        _records: &RecordArray,
    ) -> AdapterResult<Vec<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::FindQuery))
    }

    /// Fetches every record of a type.
    async fn find_all(&self, _store: &Store, _entity_type: &EntityType) -> AdapterResult<Vec<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::FindAll))
    }

    /// Follows a has-many link.
    async fn find_has_many(
        &self,
        _store: &Store,
        _snapshot: &Snapshot,
        _link: &str,
        _relationship: &RelationshipDef,
    ) -> AdapterResult<Vec<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::FindHasMany))
    }

    /// Follows a belongs-to link.
    async fn find_belongs_to(
        &self,
        _store: &Store,
        _snapshot: &Snapshot,
        _link: &str,
        _relationship: &RelationshipDef,
    ) -> AdapterResult<Option<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::FindBelongsTo))
    }

    /// Persists a new record. The returned payload usually carries the
    /// server-assigned id.
    async fn create_record(
        &self,
        _store: &Store,
        _entity_type: &EntityType,
        _snapshot: &Snapshot,
    ) -> AdapterResult<Option<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::CreateRecord))
    }

    /// Persists changes to an existing record.
    async fn update_record(
        &self,
        _store: &Store,
        _entity_type: &EntityType,
        _snapshot: &Snapshot,
    ) -> AdapterResult<Option<Value>> {
        Err(AdapterError::Unsupported(AdapterOp::UpdateRecord))
    }

    /// Deletes a record.
    async fn delete_record(
        &self,
        _store: &Store,
        _entity_type: &EntityType,
        _snapshot: &Snapshot,
    ) -> AdapterResult<()> {
        Err(AdapterError::Unsupported(AdapterOp::DeleteRecord))
    }

    /// Whether lookups of unloaded related records should be batched into
    /// [`Adapter::find_many`] calls.
    fn coalesce_find_requests(&self) -> bool {
        false
    }

    /// Client-side id for a record created without one.
    fn generate_id_for_record(&self, _store: &Store, _entity_type: &EntityType) -> Option<String> {
        None
    }
}

/// A closure-driven adapter for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    type FindFn = dyn Fn(&Store, &EntityType, &str, &Snapshot) -> AdapterResult<Value> + Send + Sync;
    type FindManyFn =
        dyn Fn(&Store, &EntityType, &[String], &[Snapshot]) -> AdapterResult<Vec<Value>> + Send + Sync;
    type FindQueryFn =
        dyn Fn(&Store, &EntityType, &Value, &RecordArray) -> AdapterResult<Vec<Value>> + Send + Sync;
    type FindAllFn = dyn Fn(&Store, &EntityType) -> AdapterResult<Vec<Value>> + Send + Sync;
    type LinkFn<T> =
        dyn Fn(&Store, &Snapshot, &str, &RelationshipDef) -> AdapterResult<T> + Send + Sync;
    type SaveFn<T> = dyn Fn(&Store, &EntityType, &Snapshot) -> AdapterResult<T> + Send + Sync;
    type IdFn = dyn Fn(&EntityType) -> Option<String> + Send + Sync;

    /// Adapter whose behaviour is supplied per operation as closures.
    ///
    /// Unconfigured operations reject with [`AdapterError::Unsupported`],
    /// except `find_many`, which falls back to `find`. Every call is counted
    /// and the snapshots it received are kept for inspection.
    #[derive(Default)]
    pub struct MockAdapter {
        find: Option<Box<FindFn>>,
        find_many: Option<Box<FindManyFn>>,
        find_query: Option<Box<FindQueryFn>>,
        find_all: Option<Box<FindAllFn>>,
        find_has_many: Option<Box<LinkFn<Vec<Value>>>>,
        find_belongs_to: Option<Box<LinkFn<Option<Value>>>>,
        create_record: Option<Box<SaveFn<Option<Value>>>>,
        update_record: Option<Box<SaveFn<Option<Value>>>>,
        delete_record: Option<Box<SaveFn<()>>>,
        generate_id: Option<Box<IdFn>>,
        coalesce: bool,
        latency: Option<Duration>,
        calls: Mutex<HashMap<AdapterOp, usize>>,
        received: Mutex<Vec<(AdapterOp, Snapshot)>>,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on_find<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &str, &Snapshot) -> AdapterResult<Value> + Send + Sync + 'static,
        {
            self.find = Some(Box::new(f));
            self
        }

        pub fn on_find_many<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &[String], &[Snapshot]) -> AdapterResult<Vec<Value>>
                + Send
                + Sync
                + 'static,
        {
            self.find_many = Some(Box::new(f));
            self
        }

        pub fn on_find_query<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &Value, &RecordArray) -> AdapterResult<Vec<Value>>
                + Send
                + Sync
                + 'static,
        {
            self.find_query = Some(Box::new(f));
            self
        }

        pub fn on_find_all<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType) -> AdapterResult<Vec<Value>> + Send + Sync + 'static,
        {
            self.find_all = Some(Box::new(f));
            self
        }

        pub fn on_find_has_many<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &Snapshot, &str, &RelationshipDef) -> AdapterResult<Vec<Value>>
                + Send
                + Sync
                + 'static,
        {
            self.find_has_many = Some(Box::new(f));
            self
        }

        pub fn on_find_belongs_to<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &Snapshot, &str, &RelationshipDef) -> AdapterResult<Option<Value>>
                + Send
                + Sync
                + 'static,
        {
            self.find_belongs_to = Some(Box::new(f));
            self
        }

        pub fn on_create<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &Snapshot) -> AdapterResult<Option<Value>> + Send + Sync + 'static,
        {
            self.create_record = Some(Box::new(f));
            self
        }

        pub fn on_update<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &Snapshot) -> AdapterResult<Option<Value>> + Send + Sync + 'static,
        {
            self.update_record = Some(Box::new(f));
            self
        }

        pub fn on_delete<F>(mut self, f: F) -> Self
        where
            F: Fn(&Store, &EntityType, &Snapshot) -> AdapterResult<()> + Send + Sync + 'static,
        {
            self.delete_record = Some(Box::new(f));
            self
        }

        pub fn on_generate_id<F>(mut self, f: F) -> Self
        where
            F: Fn(&EntityType) -> Option<String> + Send + Sync + 'static,
        {
            self.generate_id = Some(Box::new(f));
            self
        }

        /// Sets the adapter's `coalesce_find_requests` answer.
        pub fn with_coalescing(mut self, coalesce: bool) -> Self {
            self.coalesce = coalesce;
            self
        }

        /// Delays every call before its closure runs.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Number of times `op` has been invoked.
        pub fn call_count(&self, op: AdapterOp) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&op)
                .copied()
                .unwrap_or(0)
        }

        /// Snapshots received by `op`, in call order.
        pub fn snapshots(&self, op: AdapterOp) -> Vec<Snapshot> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|(o, _)| *o == op)
                .map(|(_, s)| s.clone())
                .collect()
        }

        async fn enter(&self, op: AdapterOp, snapshots: &[Snapshot]) {
            *self
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(op)
                .or_insert(0) += 1;
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(snapshots.iter().map(|s| (op, s.clone())));
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl Adapter for MockAdapter {
        async fn find(
            &self,
            store: &Store,
            entity_type: &EntityType,
            id: &str,
            snapshot: &Snapshot,
        ) -> AdapterResult<Value> {
            self.enter(AdapterOp::Find, std::slice::from_ref(snapshot)).await;
            match &self.find {
                Some(f) => f(store, entity_type, id, snapshot),
                None => Err(AdapterError::Unsupported(AdapterOp::Find)),
            }
        }

        async fn find_many(
            &self,
            store: &Store,
            entity_type: &EntityType,
            ids: &[String],
            snapshots: &[Snapshot],
        ) -> AdapterResult<Vec<Value>> {
            self.enter(AdapterOp::FindMany, snapshots).await;
            match &self.find_many {
                Some(f) => f(store, entity_type, ids, snapshots),
                None => {
                    let mut payloads = Vec::with_capacity(ids.len());
                    for (id, snapshot) in ids.iter().zip(snapshots) {
                        payloads.push(self.find(store, entity_type, id, snapshot).await?);
                    }
                    Ok(payloads)
                }
            }
        }

        async fn find_query(
            &self,
            store: &Store,
            entity_type: &EntityType,
            query: &Value,
            records: &RecordArray,
        ) -> AdapterResult<Vec<Value>> {
            self.enter(AdapterOp::FindQuery, &[]).await;
            match &self.find_query {
                Some(f) => f(store, entity_type, query, records),
                None => Err(AdapterError::Unsupported(AdapterOp::FindQuery)),
            }
        }

        async fn find_all(&self, store: &Store, entity_type: &EntityType) -> AdapterResult<Vec<Value>> {
            self.enter(AdapterOp::FindAll, &[]).await;
            match &self.find_all {
                Some(f) => f(store, entity_type),
                None => Err(AdapterError::Unsupported(AdapterOp::FindAll)),
            }
        }

        async fn find_has_many(
            &self,
            store: &Store,
            snapshot: &Snapshot,
            link: &str,
            relationship: &RelationshipDef,
        ) -> AdapterResult<Vec<Value>> {
            self.enter(AdapterOp::FindHasMany, std::slice::from_ref(snapshot)).await;
            match &self.find_has_many {
                Some(f) => f(store, snapshot, link, relationship),
                None => Err(AdapterError::Unsupported(AdapterOp::FindHasMany)),
            }
        }

        async fn find_belongs_to(
            &self,
            store: &Store,
            snapshot: &Snapshot,
            link: &str,
            relationship: &RelationshipDef,
        ) -> AdapterResult<Option<Value>> {
            self.enter(AdapterOp::FindBelongsTo, std::slice::from_ref(snapshot)).await;
            match &self.find_belongs_to {
                Some(f) => f(store, snapshot, link, relationship),
                None => Err(AdapterError::Unsupported(AdapterOp::FindBelongsTo)),
            }
        }

        async fn create_record(
            &self,
            store: &Store,
            entity_type: &EntityType,
            snapshot: &Snapshot,
        ) -> AdapterResult<Option<Value>> {
            self.enter(AdapterOp::CreateRecord, std::slice::from_ref(snapshot)).await;
            match &self.create_record {
                Some(f) => f(store, entity_type, snapshot),
                None => Err(AdapterError::Unsupported(AdapterOp::CreateRecord)),
            }
        }

        async fn update_record(
            &self,
            store: &Store,
            entity_type: &EntityType,
            snapshot: &Snapshot,
        ) -> AdapterResult<Option<Value>> {
            self.enter(AdapterOp::UpdateRecord, std::slice::from_ref(snapshot)).await;
            match &self.update_record {
                Some(f) => f(store, entity_type, snapshot),
                None => Err(AdapterError::Unsupported(AdapterOp::UpdateRecord)),
            }
        }

        async fn delete_record(
            &self,
            store: &Store,
            entity_type: &EntityType,
            snapshot: &Snapshot,
        ) -> AdapterResult<()> {
            self.enter(AdapterOp::DeleteRecord, std::slice::from_ref(snapshot)).await;
            match &self.delete_record {
                Some(f) => f(store, entity_type, snapshot),
                None => Err(AdapterError::Unsupported(AdapterOp::DeleteRecord)),
            }
        }

        fn coalesce_find_requests(&self) -> bool {
            self.coalesce
        }

        fn generate_id_for_record(&self, _store: &Store, entity_type: &EntityType) -> Option<String> {
            self.generate_id.as_ref().and_then(|f| f(entity_type))
        }
    }
}

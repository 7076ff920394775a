//! Collections of records.
//!
//! [`RecordArray`] is the fixed result of a server query. [`LiveRecordArray`]
//! is a view over the store's identity map that is recomputed on every read,
//! so it reflects records pushed after it was created.

use crate::store::Store;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tessera_model::Record;

/// The records returned by one query, in response order.
#[derive(Debug, Clone)]
pub struct RecordArray {
    type_name: String,
    query: Option<Value>,
    records: Vec<Arc<Record>>,
    is_loaded: bool,
}

impl RecordArray {
    /// An empty, not yet loaded array.
    pub fn new(type_name: impl Into<String>, query: Option<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            query,
            records: Vec::new(),
            is_loaded: false,
        }
    }

    pub(crate) fn load(&mut self, records: Vec<Arc<Record>>) {
        self.records = records;
        self.is_loaded = true;
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn query(&self) -> Option<&Value> {
        self.query.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Record>> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.iter()
    }
}

type Predicate = dyn Fn(&Record) -> bool + Send + Sync;

/// Every live record of a type, optionally narrowed by a predicate.
///
/// Deleted records and records without data are never included. Records
/// appear in the order the store first saw them.
#[derive(Clone)]
pub struct LiveRecordArray {
    store: Store,
    type_name: String,
    predicate: Option<Arc<Predicate>>,
}

impl LiveRecordArray {
    pub(crate) fn new(store: Store, type_name: impl Into<String>) -> Self {
        Self {
            store,
            type_name: type_name.into(),
            predicate: None,
        }
    }

    pub(crate) fn filtered<F>(store: Store, type_name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self {
            store,
            type_name: type_name.into(),
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Current members.
    pub fn records(&self) -> Vec<Arc<Record>> {
        self.store
            .records_of_type(&self.type_name)
            .into_iter()
            .filter(|record| record.is_loaded() && !record.is_deleted())
            .filter(|record| self.predicate.as_ref().is_none_or(|p| p(record.as_ref())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Ids of the current members that have one.
    pub fn ids(&self) -> Vec<String> {
        self.records().iter().filter_map(|r| r.id()).collect()
    }
}

impl fmt::Debug for LiveRecordArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveRecordArray")
            .field("type_name", &self.type_name)
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

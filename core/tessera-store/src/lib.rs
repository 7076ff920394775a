//! Identity-mapped entity store for Tessera.
//!
//! The [`Store`] keeps exactly one [`Record`] per `(type, id)` and mediates
//! every read and write through an [`Adapter`], the application-supplied
//! persistence backend.
//!
//! # Architecture
//!
//! - **Identity map**: records are materialized on first reference and
//!   shared by every lookup afterwards
//! - **Dispatch**: the store chooses the adapter operation from the record's
//!   state and moves the record through its lifecycle around the call
//! - **Deduplication**: concurrent finds for one record share a single
//!   adapter call; related-record lookups can be coalesced into `find_many`
//! - **Relationships**: links are followed at most once per distinct value
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tessera_model::{AttributeDef, EntityType};
//! use tessera_store::{MemoryAdapter, Store};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let adapter = MemoryAdapter::new();
//! adapter.insert("person", json!({ "id": 1, "name": "Braaaahm Dale" })).unwrap();
//!
//! let store = Store::new(Arc::new(adapter));
//! store.define(EntityType::new("person").with_attribute(AttributeDef::string("name")));
//!
//! let person = store.find("person", "1").await.unwrap();
//! assert_eq!(person.attr_str("name").as_deref(), Some("Braaaahm Dale"));
//! # });
//! ```

pub mod adapter;
mod error;
mod identity_map;
pub mod memory;
mod record_array;
mod relationships;
mod store;

pub use adapter::{Adapter, AdapterError, AdapterOp, AdapterResult};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryAdapter;
pub use record_array::{LiveRecordArray, RecordArray};
pub use store::{Store, StoreConfig};

pub use tessera_model::{EntityType, Errors, Record, RecordState, Snapshot};

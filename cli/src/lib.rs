//! Loading and command execution for the `tessera` binary.
//!
//! Everything the binary does short of argument parsing and logging setup
//! lives here so it can be exercised from tests.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tessera_model::{EntityType, Record, RelationshipKind};
use tessera_store::{MemoryAdapter, Store, StoreConfig};
use tracing::{debug, info};

/// What to look up.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch one record by id
    Find { type_name: String, id: String },
    /// Run a query; every field of the JSON object must match
    Query { type_name: String, query: String },
    /// List every record of a type
    All { type_name: String },
    /// Resolve a relationship of a record
    Related {
        type_name: String,
        id: String,
        relationship: String,
    },
}

/// A schema file is either a bare array of entity types or an object with a
/// `types` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Types(Vec<EntityType>),
    Wrapped { types: Vec<EntityType> },
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_schema(path: &Path) -> Result<Vec<EntityType>> {
    let schema: SchemaFile = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("Invalid schema in {}", path.display()))?;
    let types = match schema {
        SchemaFile::Types(types) | SchemaFile::Wrapped { types } => types,
    };
    if types.is_empty() {
        bail!("Schema {} defines no entity types", path.display());
    }
    Ok(types)
}

pub fn load_fixtures(path: &Path) -> Result<MemoryAdapter> {
    let adapter = MemoryAdapter::from_json(&read_json(path)?)
        .with_context(|| format!("Invalid fixtures in {}", path.display()))?;
    Ok(adapter)
}

pub fn load_config(path: &Path) -> Result<StoreConfig> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("Invalid store config in {}", path.display()))
}

/// A store over `adapter` with every type in `schema` defined.
pub fn build_store(schema: Vec<EntityType>, adapter: MemoryAdapter, config: StoreConfig) -> Store {
    let store = Store::with_config(Arc::new(adapter), config);
    for entity_type in schema {
        store.define(entity_type);
    }
    info!("Store '{}' ready", store.config().name);
    store
}

fn render(record: &Record) -> Value {
    record.snapshot().to_json(true)
}

fn render_all<'a>(records: impl IntoIterator<Item = &'a Arc<Record>>) -> Value {
    Value::Array(records.into_iter().map(|r| render(r)).collect())
}

/// Runs a command and returns its JSON output.
pub async fn execute(store: &Store, command: &Command) -> Result<Value> {
    debug!("Executing {:?}", command);
    match command {
        Command::Find { type_name, id } => {
            let record = store
                .find(type_name, id)
                .await
                .with_context(|| format!("Failed to find {type_name}:{id}"))?;
            Ok(render(&record))
        }
        Command::Query { type_name, query } => {
            let query: Value = serde_json::from_str(query).context("Query must be valid JSON")?;
            let results = store
                .find_query(type_name, query)
                .await
                .with_context(|| format!("Query against {type_name} failed"))?;
            Ok(render_all(results.iter()))
        }
        Command::All { type_name } => {
            let all = store
                .find_all(type_name)
                .await
                .with_context(|| format!("Failed to load {type_name} records"))?;
            Ok(render_all(&all.records()))
        }
        Command::Related {
            type_name,
            id,
            relationship,
        } => {
            let owner = store
                .find(type_name, id)
                .await
                .with_context(|| format!("Failed to find {type_name}:{id}"))?;
            let Some(kind) = owner.entity_type().relationship(relationship).map(|r| r.kind) else {
                bail!("'{type_name}' has no relationship named '{relationship}'");
            };
            match kind {
                RelationshipKind::HasMany => {
                    let related = store
                        .has_many(&owner, relationship)
                        .await
                        .with_context(|| format!("Failed to load {type_name}:{id}.{relationship}"))?;
                    Ok(render_all(&related))
                }
                RelationshipKind::BelongsTo => {
                    let related = store
                        .belongs_to(&owner, relationship)
                        .await
                        .with_context(|| format!("Failed to load {type_name}:{id}.{relationship}"))?;
                    Ok(related.map(|r| render(&r)).unwrap_or(Value::Null))
                }
            }
        }
    }
}

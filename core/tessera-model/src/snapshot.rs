use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tessera_types::ClientId;

/// Identifiers held by one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    BelongsTo(Option<String>),
    HasMany(Vec<String>),
}

impl RelationshipData {
    /// Ids in the relationship, in order.
    pub fn ids(&self) -> Vec<String> {
        match self {
            RelationshipData::BelongsTo(id) => id.iter().cloned().collect(),
            RelationshipData::HasMany(ids) => ids.clone(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            RelationshipData::BelongsTo(Some(id)) => Value::String(id.clone()),
            RelationshipData::BelongsTo(None) => Value::Null,
            RelationshipData::HasMany(ids) => {
                Value::Array(ids.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Immutable view of a record, taken when an adapter call is issued.
///
/// The snapshot owns its data; later edits to the record do not show up in
/// it, and it offers no way to reach back into the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    type_name: String,
    id: Option<String>,
    client_id: ClientId,
    attributes: Map<String, Value>,
    relationships: BTreeMap<String, RelationshipData>,
}

impl Snapshot {
    pub(crate) fn new(
        type_name: String,
        id: Option<String>,
        client_id: ClientId,
        attributes: Map<String, Value>,
        relationships: BTreeMap<String, RelationshipData>,
    ) -> Self {
        Self {
            type_name,
            id,
            client_id,
            attributes,
            relationships,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Value of an attribute; `Null` when declared but unset.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Value::as_str)
    }

    /// Every declared attribute.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Id referenced by a belongs-to relationship.
    pub fn belongs_to(&self, name: &str) -> Option<&str> {
        match self.relationships.get(name) {
            Some(RelationshipData::BelongsTo(id)) => id.as_deref(),
            _ => None,
        }
    }

    /// Ids referenced by a has-many relationship, if it holds data.
    pub fn has_many(&self, name: &str) -> Option<&[String]> {
        match self.relationships.get(name) {
            Some(RelationshipData::HasMany(ids)) => Some(ids.as_slice()),
            _ => None,
        }
    }

    pub fn relationships(&self) -> &BTreeMap<String, RelationshipData> {
        &self.relationships
    }

    /// Renders the snapshot in payload form: attributes and relationship ids
    /// side by side, plus `id` when asked for and known.
    pub fn to_json(&self, include_id: bool) -> Value {
        let mut hash = self.attributes.clone();
        for (name, data) in &self.relationships {
            hash.insert(name.clone(), data.to_json());
        }
        if include_id {
            if let Some(id) = &self.id {
                hash.insert("id".into(), Value::String(id.clone()));
            }
        }
        Value::Object(hash)
    }
}

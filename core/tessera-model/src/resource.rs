//! Payload normalization.
//!
//! Adapters return loosely shaped JSON. [`ResourceData::from_json`] reads it
//! against an [`EntityType`] and keeps only what the type declares.

use crate::error::{ModelError, ModelResult};
use crate::schema::{EntityType, RelationshipKind};
use crate::snapshot::RelationshipData;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tessera_types::coerce_id;

const ID_KEY: &str = "id";
const LINKS_KEY: &str = "links";

/// Normalized record data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    pub id: Option<String>,
    /// Declared attributes present in the payload.
    pub attributes: Map<String, Value>,
    /// Relationships present in the payload.
    pub relationships: BTreeMap<String, RelationshipData>,
    /// Relationship name to link.
    pub links: BTreeMap<String, String>,
}

impl ResourceData {
    /// Normalizes a payload object.
    ///
    /// Keys that are neither `id`, `links`, a declared attribute nor a
    /// declared relationship are ignored.
    pub fn from_json(entity_type: &EntityType, payload: &Value) -> ModelResult<Self> {
        let object = payload.as_object().ok_or_else(|| ModelError::Normalization {
            type_name: entity_type.name.clone(),
            reason: format!("expected an object, got {payload}"),
        })?;

        let mut data = ResourceData::default();
        for (key, value) in object {
            if key == ID_KEY {
                if !value.is_null() {
                    data.id = Some(coerce_id(value)?);
                }
            } else if key == LINKS_KEY {
                data.links = normalize_links(entity_type, value)?;
            } else if entity_type.has_attribute(key) {
                data.attributes.insert(key.clone(), value.clone());
            } else if let Some(relationship) = entity_type.relationship(key) {
                let normalized = match relationship.kind {
                    RelationshipKind::BelongsTo => {
                        RelationshipData::BelongsTo(reference_id(entity_type, key, value)?)
                    }
                    RelationshipKind::HasMany => {
                        RelationshipData::HasMany(reference_ids(entity_type, key, value)?)
                    }
                };
                data.relationships.insert(key.clone(), normalized);
            }
        }
        Ok(data)
    }

    /// Normalizes the properties given to a newly created record: the same
    /// rules as payloads, but unknown keys are an error.
    pub fn from_properties(entity_type: &EntityType, properties: &Value) -> ModelResult<Self> {
        if let Some(object) = properties.as_object() {
            if let Some(unknown) = object.keys().find(|key| {
                key.as_str() != ID_KEY
                    && !entity_type.has_attribute(key)
                    && entity_type.relationship(key).is_none()
            }) {
                return Err(ModelError::UnknownAttribute {
                    type_name: entity_type.name.clone(),
                    name: unknown.clone(),
                });
            }
        }
        Self::from_json(entity_type, properties)
    }
}

fn normalize_links(entity_type: &EntityType, value: &Value) -> ModelResult<BTreeMap<String, String>> {
    let Some(links) = value.as_object() else {
        return Err(ModelError::Normalization {
            type_name: entity_type.name.clone(),
            reason: format!("`links` must be an object, got {value}"),
        });
    };
    let mut normalized = BTreeMap::new();
    for (name, link) in links {
        if entity_type.relationship(name).is_none() {
            continue;
        }
        match link {
            Value::String(link) => {
                normalized.insert(name.clone(), link.clone());
            }
            Value::Null => {}
            other => {
                return Err(ModelError::Normalization {
                    type_name: entity_type.name.clone(),
                    reason: format!("link for '{name}' must be a string, got {other}"),
                });
            }
        }
    }
    Ok(normalized)
}

fn reference_id(entity_type: &EntityType, name: &str, value: &Value) -> ModelResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(embedded) => match embedded.get(ID_KEY) {
            Some(id) => Ok(Some(coerce_id(id)?)),
            None => Err(ModelError::Normalization {
                type_name: entity_type.name.clone(),
                reason: format!("embedded '{name}' has no id"),
            }),
        },
        other => Ok(Some(coerce_id(other)?)),
    }
}

fn reference_ids(entity_type: &EntityType, name: &str, value: &Value) -> ModelResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                reference_id(entity_type, name, item)?.ok_or_else(|| ModelError::Normalization {
                    type_name: entity_type.name.clone(),
                    reason: format!("'{name}' contains a null id"),
                })
            })
            .collect(),
        other => Err(ModelError::Normalization {
            type_name: entity_type.name.clone(),
            reason: format!("'{name}' must be an array of ids, got {other}"),
        }),
    }
}

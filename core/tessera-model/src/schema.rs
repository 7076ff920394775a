use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes an entity type: its attributes and its relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl EntityType {
    /// An entity type with no attributes or relationships yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Adds an attribute definition, replacing one of the same name.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.retain(|a| a.name != attribute.name);
        self.attributes.push(attribute);
        self
    }

    /// Adds a relationship definition, replacing one of the same name.
    #[must_use]
    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.retain(|r| r.name != relationship.name);
        self.relationships.push(relationship);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// A plain value stored on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default)]
    pub kind: AttributeKind,
    /// Value read back when the record holds none for this attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl AttributeDef {
    fn simple(name: &str, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default_value: None,
        }
    }

    /// Shorthand for a string attribute.
    pub fn string(name: &str) -> Self {
        Self::simple(name, AttributeKind::String)
    }

    /// Shorthand for a numeric attribute.
    pub fn number(name: &str) -> Self {
        Self::simple(name, AttributeKind::Number)
    }

    /// Shorthand for a boolean attribute.
    pub fn boolean(name: &str) -> Self {
        Self::simple(name, AttributeKind::Boolean)
    }

    /// Shorthand for a date attribute (ISO-8601 text on the wire).
    pub fn date(name: &str) -> Self {
        Self::simple(name, AttributeKind::Date)
    }

    /// Shorthand for an untyped attribute.
    pub fn any(name: &str) -> Self {
        Self::simple(name, AttributeKind::Any)
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Declared kind of an attribute.
///
/// Purely descriptive: values are stored as given, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Number,
    Boolean,
    Date,
    #[default]
    Any,
}

/// A reference from one entity type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub kind: RelationshipKind,
    pub target_type: String,
    /// Async relationships are fetched through the adapter on access;
    /// sync ones only resolve records already loaded.
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

impl RelationshipDef {
    /// A to-many relationship, sync by default.
    pub fn has_many(name: &str, target_type: &str) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::HasMany,
            target_type: target_type.into(),
            is_async: false,
        }
    }

    /// A to-one relationship, sync by default.
    pub fn belongs_to(name: &str, target_type: &str) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::BelongsTo,
            target_type: target_type.into(),
            is_async: false,
        }
    }

    /// Marks the relationship as fetched on access.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    BelongsTo,
    HasMany,
}

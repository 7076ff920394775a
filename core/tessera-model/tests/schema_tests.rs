use pretty_assertions::assert_eq;
use serde_json::json;
use tessera_model::{AttributeDef, AttributeKind, EntityType, RelationshipDef, RelationshipKind};

fn person() -> EntityType {
    EntityType::new("person")
        .with_attribute(AttributeDef::string("name"))
        .with_attribute(AttributeDef::string("updatedAt"))
        .with_relationship(RelationshipDef::has_many("dogs", "dog").asynchronous())
        .with_relationship(RelationshipDef::belongs_to("owner", "person"))
}

// ── Builders ─────────────────────────────────────────────────────

#[test]
fn attribute_shorthands_set_kind() {
    assert_eq!(AttributeDef::string("a").kind, AttributeKind::String);
    assert_eq!(AttributeDef::number("a").kind, AttributeKind::Number);
    assert_eq!(AttributeDef::boolean("a").kind, AttributeKind::Boolean);
    assert_eq!(AttributeDef::date("a").kind, AttributeKind::Date);
    assert_eq!(AttributeDef::any("a").kind, AttributeKind::Any);
}

#[test]
fn attribute_default_value() {
    let attr = AttributeDef::boolean("archived").with_default(false);
    assert_eq!(attr.default_value, Some(json!(false)));
    assert_eq!(AttributeDef::string("name").default_value, None);
}

#[test]
fn relationship_shorthands() {
    let dogs = RelationshipDef::has_many("dogs", "dog");
    assert_eq!(dogs.kind, RelationshipKind::HasMany);
    assert_eq!(dogs.target_type, "dog");
    assert!(!dogs.is_async);

    let owner = RelationshipDef::belongs_to("owner", "person").asynchronous();
    assert_eq!(owner.kind, RelationshipKind::BelongsTo);
    assert!(owner.is_async);
}

#[test]
fn with_attribute_replaces_same_name() {
    let ty = EntityType::new("dog")
        .with_attribute(AttributeDef::string("name"))
        .with_attribute(AttributeDef::any("name"));
    assert_eq!(ty.attributes.len(), 1);
    assert_eq!(ty.attributes[0].kind, AttributeKind::Any);
}

#[test]
fn with_relationship_replaces_same_name() {
    let ty = person().with_relationship(RelationshipDef::has_many("dogs", "dog"));
    assert_eq!(ty.relationships.len(), 2);
    assert!(!ty.relationship("dogs").unwrap().is_async);
}

// ── Lookups ──────────────────────────────────────────────────────

#[test]
fn lookups_by_name() {
    let ty = person();
    assert!(ty.has_attribute("name"));
    assert!(!ty.has_attribute("dogs"));
    assert!(ty.attribute("missing").is_none());
    assert_eq!(ty.relationship("owner").unwrap().target_type, "person");
    assert!(ty.relationship("name").is_none());
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn entity_type_deserializes_with_defaults() {
    let ty: EntityType = serde_json::from_value(json!({
        "name": "person",
        "attributes": [{"name": "name", "kind": "string"}, {"name": "misc"}],
        "relationships": [{"name": "dogs", "kind": "has_many", "target_type": "dog", "async": true}]
    }))
    .unwrap();

    assert_eq!(ty.attribute("name").unwrap().kind, AttributeKind::String);
    assert_eq!(ty.attribute("misc").unwrap().kind, AttributeKind::Any);
    let dogs = ty.relationship("dogs").unwrap();
    assert_eq!(dogs.kind, RelationshipKind::HasMany);
    assert!(dogs.is_async);
}

#[test]
fn entity_type_without_fields_deserializes() {
    let ty: EntityType = serde_json::from_value(json!({"name": "tag"})).unwrap();
    assert!(ty.attributes.is_empty());
    assert!(ty.relationships.is_empty());
}

#[test]
fn relationship_async_flag_uses_async_key() {
    let json = serde_json::to_value(RelationshipDef::belongs_to("dog", "dog").asynchronous()).unwrap();
    assert_eq!(json["async"], json!(true));
    assert_eq!(json["kind"], json!("belongs_to"));
}

#[test]
fn schema_roundtrips_through_json() {
    let ty = person();
    let back: EntityType = serde_json::from_value(serde_json::to_value(&ty).unwrap()).unwrap();
    assert_eq!(back, ty);
}

use pretty_assertions::assert_eq;
use serde_json::json;
use tessera_model::{
    AttributeDef, EntityType, ModelError, RelationshipData, RelationshipDef, ResourceData,
};

fn person() -> EntityType {
    EntityType::new("person")
        .with_attribute(AttributeDef::string("name"))
        .with_attribute(AttributeDef::string("updatedAt"))
        .with_relationship(RelationshipDef::has_many("dogs", "dog").asynchronous())
        .with_relationship(RelationshipDef::belongs_to("dog", "dog").asynchronous())
}

// ── Payloads ─────────────────────────────────────────────────────

#[test]
fn normalizes_id_and_attributes() {
    let data = ResourceData::from_json(&person(), &json!({"id": 1, "name": "Tom Dale"})).unwrap();
    assert_eq!(data.id.as_deref(), Some("1"));
    assert_eq!(data.attributes.get("name"), Some(&json!("Tom Dale")));
    assert!(data.relationships.is_empty());
    assert!(data.links.is_empty());
}

#[test]
fn payload_without_id() {
    let data = ResourceData::from_json(&person(), &json!({"name": "x"})).unwrap();
    assert_eq!(data.id, None);
    let data = ResourceData::from_json(&person(), &json!({"id": null})).unwrap();
    assert_eq!(data.id, None);
}

#[test]
fn unknown_payload_keys_are_ignored() {
    let data =
        ResourceData::from_json(&person(), &json!({"id": "1", "favoriteColor": "red"})).unwrap();
    assert!(data.attributes.is_empty());
}

#[test]
fn has_many_ids_are_coerced() {
    let data = ResourceData::from_json(&person(), &json!({"id": 1, "dogs": [1, "2", {"id": 3}]}))
        .unwrap();
    assert_eq!(
        data.relationships.get("dogs"),
        Some(&RelationshipData::HasMany(vec!["1".into(), "2".into(), "3".into()]))
    );
}

#[test]
fn belongs_to_accepts_null_id_or_object() {
    let ty = person();
    let none = ResourceData::from_json(&ty, &json!({"dog": null})).unwrap();
    assert_eq!(none.relationships.get("dog"), Some(&RelationshipData::BelongsTo(None)));

    let id = ResourceData::from_json(&ty, &json!({"dog": 2})).unwrap();
    assert_eq!(id.relationships.get("dog"), Some(&RelationshipData::BelongsTo(Some("2".into()))));

    let embedded = ResourceData::from_json(&ty, &json!({"dog": {"id": "7"}})).unwrap();
    assert_eq!(
        embedded.relationships.get("dog"),
        Some(&RelationshipData::BelongsTo(Some("7".into())))
    );
}

#[test]
fn links_are_read_for_declared_relationships() {
    let data = ResourceData::from_json(
        &person(),
        &json!({"id": 1, "links": {"dogs": "/dogs", "cats": "/cats"}}),
    )
    .unwrap();
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links.get("dogs").map(String::as_str), Some("/dogs"));
}

// ── Rejections ───────────────────────────────────────────────────

#[test]
fn non_object_payload_is_rejected() {
    let err = ResourceData::from_json(&person(), &json!([1, 2])).unwrap_err();
    assert!(matches!(err, ModelError::Normalization { .. }));
}

#[test]
fn malformed_id_is_rejected() {
    let err = ResourceData::from_json(&person(), &json!({"id": true})).unwrap_err();
    assert!(matches!(err, ModelError::Id(_)));
}

#[test]
fn non_string_link_is_rejected() {
    let err = ResourceData::from_json(&person(), &json!({"links": {"dogs": 5}})).unwrap_err();
    assert!(matches!(err, ModelError::Normalization { .. }));
}

#[test]
fn has_many_must_be_array() {
    let err = ResourceData::from_json(&person(), &json!({"dogs": "1"})).unwrap_err();
    assert!(matches!(err, ModelError::Normalization { .. }));
}

#[test]
fn has_many_rejects_null_members() {
    assert!(ResourceData::from_json(&person(), &json!({"dogs": [1, null]})).is_err());
}

// ── Create properties ────────────────────────────────────────────

#[test]
fn properties_reject_unknown_keys() {
    let err =
        ResourceData::from_properties(&person(), &json!({"name": "x", "nickname": "y"})).unwrap_err();
    assert_eq!(
        err,
        ModelError::UnknownAttribute {
            type_name: "person".into(),
            name: "nickname".into(),
        }
    );
}

#[test]
fn properties_accept_id_attributes_and_relationships() {
    let data =
        ResourceData::from_properties(&person(), &json!({"id": 1, "name": "x", "dogs": [2]}))
            .unwrap();
    assert_eq!(data.id.as_deref(), Some("1"));
    assert_eq!(data.relationships.len(), 1);
}

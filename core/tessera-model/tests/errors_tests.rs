use pretty_assertions::assert_eq;
use serde_json::json;
use tessera_model::{Errors, ValidationMessage};

#[test]
fn new_error_set_is_empty() {
    let errors = Errors::new();
    assert!(errors.is_empty());
    assert_eq!(errors.len(), 0);
    assert!(errors.get("name").is_empty());
    assert!(errors.errors_for(Errors::BASE).is_empty());
}

#[test]
fn messages_keep_insertion_order() {
    let mut errors = Errors::new();
    errors.add("name", "is too short");
    errors.add("name", "requires a \"bro\"");
    assert_eq!(errors.get("name"), ["is too short", "requires a \"bro\""]);
    assert_eq!(errors.len(), 2);
}

#[test]
fn errors_for_pairs_attribute_and_message() {
    let errors = Errors::from_map([(Errors::BASE, ["is a generally unsavoury character"])]);
    assert_eq!(
        errors.errors_for("base"),
        vec![ValidationMessage {
            attribute: "base".into(),
            message: "is a generally unsavoury character".into(),
        }]
    );
}

#[test]
fn from_map_drops_attributes_without_messages() {
    let errors = Errors::from_map([("name", vec!["bad"]), ("age", vec![])]);
    assert!(errors.has("name"));
    assert!(!errors.has("age"));
    assert_eq!(errors.attributes().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn remove_only_touches_one_attribute() {
    let mut errors = Errors::from_map([("name", ["bad"]), ("base", ["worse"])]);
    assert!(errors.remove("name"));
    assert!(!errors.remove("name"));
    assert!(!errors.is_empty());
    assert!(errors.has("base"));
}

#[test]
fn clear_removes_everything() {
    let mut errors = Errors::from_map([("name", ["bad"]), ("base", ["worse"])]);
    errors.clear();
    assert!(errors.is_empty());
}

#[test]
fn iter_flattens_all_messages() {
    let errors = Errors::from_map([("name", vec!["a", "b"]), ("base", vec!["c"])]);
    let all: Vec<_> = errors.iter().map(|m| (m.attribute, m.message)).collect();
    assert_eq!(
        all,
        vec![
            ("base".to_string(), "c".to_string()),
            ("name".to_string(), "a".to_string()),
            ("name".to_string(), "b".to_string()),
        ]
    );
}

#[test]
fn display_joins_messages() {
    let errors = Errors::from_map([("name", ["common... name requires a \"bro\""])]);
    assert_eq!(errors.to_string(), "name common... name requires a \"bro\"");
}

#[test]
fn serializes_as_attribute_map() {
    let errors = Errors::from_map([("name", ["bad"])]);
    assert_eq!(serde_json::to_value(&errors).unwrap(), json!({"name": ["bad"]}));
    let back: Errors = serde_json::from_value(json!({"name": ["bad"]})).unwrap();
    assert_eq!(back, errors);
}

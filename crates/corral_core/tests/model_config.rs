//! Models are plain serde values, so embedding applications can ship them
//! as configuration instead of building descriptors in code.

use corral_core::{AttributeKind, Corral, CorralConfig, Model, StoreKind};

const PEOPLE_MODEL: &str = r#"
{
  "entities": [
    {
      "name": "Person",
      "attributes": [
        { "name": "name", "kind": "text" },
        { "name": "reg_no", "kind": "integer" },
        { "name": "active", "kind": "boolean" }
      ]
    }
  ]
}
"#;

#[test]
fn model_loads_from_json_and_opens_a_session() {
    let model: Model = serde_json::from_str(PEOPLE_MODEL).unwrap();
    assert!(model.validate().is_ok());

    let person = model.entity("Person").unwrap();
    assert_eq!(person.attribute("reg_no").unwrap().kind, AttributeKind::Integer);

    let corral = Corral::open(CorralConfig::new(model, StoreKind::InMemory)).unwrap();
    assert_eq!(corral.store_kind(), StoreKind::InMemory);
}

#[test]
fn model_round_trips_through_json() {
    let model: Model = serde_json::from_str(PEOPLE_MODEL).unwrap();
    let encoded = serde_json::to_string(&model).unwrap();
    let decoded: Model = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, model);
}

#[test]
fn malformed_attribute_kind_is_rejected() {
    let bad = PEOPLE_MODEL.replace("integer", "decimal");
    assert!(serde_json::from_str::<Model>(&bad).is_err());
}

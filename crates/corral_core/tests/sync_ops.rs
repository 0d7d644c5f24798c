use corral_core::{
    AttributeKind, AttributeMap, Corral, CorralConfig, EntityDescriptor, Model, Predicate, SortKey,
    StoreKind, Value,
};

fn model() -> Model {
    Model::new(vec![EntityDescriptor::new("Person")
        .with_attribute("name", AttributeKind::Text)
        .with_attribute("reg_no", AttributeKind::Integer)])
}

fn open_in_memory() -> Corral {
    Corral::open(CorralConfig::new(model(), StoreKind::InMemory)).unwrap()
}

fn person(name: &str, reg_no: i64) -> AttributeMap {
    [
        ("name".to_string(), Value::Text(name.to_string())),
        ("reg_no".to_string(), Value::Integer(reg_no)),
    ]
    .into()
}

#[test]
fn insert_and_fetch_roundtrip() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    let fetched = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(fetched.attribute("name"), Some(&Value::Text("ada".into())));
    assert_eq!(fetched.attribute("reg_no"), Some(&Value::Integer(10)));
    assert_eq!(fetched.owner(), corral.root_domain().id());
}

#[test]
fn unsaved_insert_is_visible_in_its_own_domain() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), false, None);

    assert!(corral.fetch_by_id(&record.id, None).is_some());
    assert_eq!(corral.count("Person", &Predicate::All, None), 1);
    assert!(corral.has_changes(None));
}

#[test]
fn delete_by_id_is_idempotent() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    assert!(corral.delete_by_id(&record.id, true, None));
    assert!(!corral.delete_by_id(&record.id, true, None));
    assert!(corral.fetch_by_id(&record.id, None).is_none());
}

#[test]
fn update_by_id_reports_whether_the_record_was_found() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    assert!(corral.update_by_id(&record.id, person("ada", 11), true, None));
    let fetched = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(fetched.attribute("reg_no"), Some(&Value::Integer(11)));

    corral.delete_by_id(&record.id, true, None);
    assert!(!corral.update_by_id(&record.id, person("ada", 12), true, None));
}

#[test]
fn fetch_all_applies_predicate_and_multi_key_sort() {
    let corral = open_in_memory();
    corral.insert_with("Person", person("carol", 30), false, None);
    corral.insert_with("Person", person("ada", 10), false, None);
    corral.insert_with("Person", person("bob", 30), false, None);
    corral.save_root();

    let records = corral.fetch_all(
        "Person",
        &Predicate::ge("reg_no", 10),
        &[SortKey::desc("reg_no"), SortKey::asc("name")],
        None,
    );
    let names: Vec<_> = records
        .iter()
        .map(|record| record.attribute("name").cloned().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            Value::Text("bob".into()),
            Value::Text("carol".into()),
            Value::Text("ada".into())
        ]
    );
}

#[test]
fn pending_updates_change_predicate_matches() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    assert!(corral.update_by_id(&record.id, person("ada", 30), false, None));
    assert_eq!(corral.count("Person", &Predicate::eq("reg_no", 30), None), 1);
    assert_eq!(corral.count("Person", &Predicate::eq("reg_no", 10), None), 0);

    let matching = corral.fetch_all("Person", &Predicate::eq("reg_no", 30), &[], None);
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].id, record.id);
}

#[test]
fn revert_discards_pending_changes() {
    let corral = open_in_memory();
    let kept = corral.insert_with("Person", person("ada", 10), true, None);
    corral.insert_with("Person", person("bob", 20), false, None);
    assert!(corral.has_changes(None));

    corral.revert(None);
    assert!(!corral.has_changes(None));
    let records = corral.fetch_all("Person", &Predicate::All, &[], None);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, kept.id);
}

#[test]
fn reverted_update_restores_committed_attributes() {
    let corral = open_in_memory();
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    corral.update_by_id(&record.id, person("ada", 99), false, None);
    corral.revert(None);

    let fetched = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(fetched.attribute("reg_no"), Some(&Value::Integer(10)));
}

#[test]
fn fetch_rows_projects_committed_state_only() {
    let corral = open_in_memory();
    corral.insert_with("Person", person("ada", 10), true, None);
    corral.insert_with("Person", person("bob", 20), false, None);

    let rows = corral.fetch_rows(
        "Person",
        &["name".to_string()],
        &Predicate::All,
        &[SortKey::asc("name")],
        false,
        None,
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::Text("ada".into())));
}

#[test]
fn aggregate_is_unavailable_on_in_memory_kind() {
    let corral = open_in_memory();
    corral.insert_with("Person", person("ada", 10), true, None);

    let row = corral.aggregate(
        corral_core::AggregateFunction::Sum,
        "Person",
        "reg_no",
        &Predicate::All,
        None,
    );
    assert!(row.is_none());
}

#[test]
fn open_rejects_an_invalid_model() {
    let bad = Model::new(vec![
        EntityDescriptor::new("Person").with_attribute("record_id", AttributeKind::Text),
    ]);
    assert!(Corral::open(CorralConfig::new(bad, StoreKind::InMemory)).is_err());
}

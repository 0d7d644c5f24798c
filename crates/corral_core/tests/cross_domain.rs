//! Save/propagate behavior across confinement domains.

use corral_core::{
    AttributeKind, AttributeMap, Corral, CorralConfig, EntityDescriptor, MergePolicy, Model,
    OperationOptions, Predicate, StoreKind, Value,
};
use std::sync::mpsc;
use std::time::Duration;

fn model() -> Model {
    Model::new(vec![EntityDescriptor::new("Person")
        .with_attribute("name", AttributeKind::Text)
        .with_attribute("reg_no", AttributeKind::Integer)])
}

fn open_with_policy(policy: MergePolicy) -> Corral {
    let config = CorralConfig::new(model(), StoreKind::InMemory).with_merge_policy(policy);
    Corral::open(config).unwrap()
}

fn person(name: &str, reg_no: i64) -> AttributeMap {
    [
        ("name".to_string(), Value::Text(name.to_string())),
        ("reg_no".to_string(), Value::Integer(reg_no)),
    ]
    .into()
}

#[test]
fn derived_save_makes_the_record_visible_on_root() {
    let corral = open_with_policy(MergePolicy::ObjectTrump);
    let derived = corral.new_derived_domain().unwrap();

    let record = corral.insert_with("Person", person("ada", 10), true, Some(&derived));

    let on_root = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(on_root.attributes, record.attributes);
    assert_eq!(on_root.owner(), corral.root_domain().id());
}

#[test]
fn derived_delete_with_save_empties_every_domain() {
    let corral = open_with_policy(MergePolicy::ObjectTrump);
    let derived = corral.new_derived_domain().unwrap();

    let record = corral.insert_with("Person", person("ada", 10), true, None);
    assert!(corral.fetch_by_id(&record.id, Some(&derived)).is_some());

    assert!(corral.delete_by_id(&record.id, true, Some(&derived)));
    assert!(corral.fetch_by_id(&record.id, None).is_none());
    assert!(corral.fetch_by_id(&record.id, Some(&derived)).is_none());
}

#[test]
fn root_confined_delivery_observes_the_merged_save() {
    let corral = open_with_policy(MergePolicy::ObjectTrump);
    let derived = corral.new_derived_domain().unwrap();

    let (tx, rx) = mpsc::channel();
    let options = OperationOptions::on(&derived).saving().completing_on_root();
    corral.insert_async("Person", person("ada", 42), options, move |record| {
        tx.send(record).unwrap();
    });

    let delivered = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(delivered.owner(), corral.root_domain().id());
    assert_eq!(delivered.attribute("reg_no"), Some(&Value::Integer(42)));

    let refetched = corral.fetch_by_id(&delivered.id, None).unwrap();
    assert_eq!(refetched.attribute("reg_no"), Some(&Value::Integer(42)));
}

#[test]
fn object_trump_keeps_local_pending_changes_through_a_merge() {
    let corral = open_with_policy(MergePolicy::ObjectTrump);
    let derived = corral.new_derived_domain().unwrap();

    let record = corral.insert_with("Person", person("ada", 10), true, None);

    // Root holds a pending, unsaved update.
    assert!(corral.update_by_id(&record.id, person("local", 10), false, None));
    // A conflicting change is saved from the derived domain and merged in.
    assert!(corral.update_by_id(&record.id, person("remote", 10), true, Some(&derived)));

    let on_root = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(on_root.attribute("name"), Some(&Value::Text("local".into())));
    assert!(corral.has_changes(None));
}

#[test]
fn store_trump_replaces_local_pending_changes_on_merge() {
    let corral = open_with_policy(MergePolicy::StoreTrump);
    let derived = corral.new_derived_domain().unwrap();

    let record = corral.insert_with("Person", person("ada", 10), true, None);

    assert!(corral.update_by_id(&record.id, person("local", 10), false, None));
    assert!(corral.update_by_id(&record.id, person("remote", 10), true, Some(&derived)));

    let on_root = corral.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(on_root.attribute("name"), Some(&Value::Text("remote".into())));
}

#[test]
fn domains_only_observe_each_other_through_saves() {
    let corral = open_with_policy(MergePolicy::ObjectTrump);
    let derived = corral.new_derived_domain().unwrap();

    let record = corral.insert_with("Person", person("ada", 10), false, Some(&derived));
    // Unsaved: invisible outside the inserting domain.
    assert!(corral.fetch_by_id(&record.id, None).is_none());
    assert_eq!(corral.count("Person", &Predicate::All, None), 0);

    assert!(corral.save_domain(Some(&derived)));
    assert!(corral.fetch_by_id(&record.id, None).is_some());
}

//! Exercises every row of the completion-delivery table by observing which
//! domain owns the record each completion receives.

use corral_core::{
    AttributeKind, AttributeMap, Corral, CorralConfig, EntityDescriptor, Model, OperationOptions,
    Record, StoreKind, Value,
};
use std::sync::mpsc;
use std::time::Duration;

fn open_in_memory() -> Corral {
    let model = Model::new(vec![EntityDescriptor::new("Person")
        .with_attribute("name", AttributeKind::Text)
        .with_attribute("reg_no", AttributeKind::Integer)]);
    Corral::open(CorralConfig::new(model, StoreKind::InMemory)).unwrap()
}

fn person(reg_no: i64) -> AttributeMap {
    [
        ("name".to_string(), Value::Text("ada".to_string())),
        ("reg_no".to_string(), Value::Integer(reg_no)),
    ]
    .into()
}

fn insert_routed(corral: &Corral, options: OperationOptions) -> Option<Record> {
    let (tx, rx) = mpsc::channel();
    corral.insert_async("Person", person(10), options, move |record| {
        tx.send(record).unwrap();
    });
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn implicit_domain_no_save_delivers_from_root() {
    let corral = open_in_memory();
    let record = insert_routed(&corral, OperationOptions::default()).unwrap();
    assert_eq!(record.owner(), corral.root_domain().id());
}

#[test]
fn implicit_domain_root_delivery_needs_no_redispatch() {
    let corral = open_in_memory();
    let options = OperationOptions::default().completing_on_root();
    let record = insert_routed(&corral, options).unwrap();
    assert_eq!(record.owner(), corral.root_domain().id());
}

#[test]
fn implicit_domain_with_save_persists_before_delivery() {
    let corral = open_in_memory();
    let options = OperationOptions::default().saving();
    let record = insert_routed(&corral, options).unwrap();
    assert_eq!(record.owner(), corral.root_domain().id());
    assert!(!corral.has_changes(None));
}

#[test]
fn implicit_domain_with_save_and_root_delivery_behaves_the_same() {
    let corral = open_in_memory();
    let options = OperationOptions::default().saving().completing_on_root();
    let record = insert_routed(&corral, options).unwrap();
    assert_eq!(record.owner(), corral.root_domain().id());
    assert!(!corral.has_changes(None));
}

#[test]
fn explicit_domain_no_save_delivers_from_that_domain() {
    let corral = open_in_memory();
    let derived = corral.new_derived_domain().unwrap();
    let record = insert_routed(&corral, OperationOptions::on(&derived)).unwrap();
    assert_eq!(record.owner(), derived.id());
}

#[test]
fn explicit_domain_root_delivery_reresolves_on_root() {
    let corral = open_in_memory();
    let derived = corral.new_derived_domain().unwrap();

    // The insert was never saved, so root-side re-resolution finds nothing.
    let options = OperationOptions::on(&derived).completing_on_root();
    assert!(insert_routed(&corral, options).is_none());

    // The derived domain still holds it as a pending insert.
    assert!(corral.has_changes(Some(&derived)));
}

#[test]
fn explicit_domain_with_save_delivers_from_that_domain() {
    let corral = open_in_memory();
    let derived = corral.new_derived_domain().unwrap();
    let options = OperationOptions::on(&derived).saving();
    let record = insert_routed(&corral, options).unwrap();
    assert_eq!(record.owner(), derived.id());

    // The save made the record resolvable on root as well.
    assert!(corral.fetch_by_id(&record.id, None).is_some());
}

#[test]
fn explicit_domain_with_save_and_root_delivery_delivers_root_owned_record() {
    let corral = open_in_memory();
    let derived = corral.new_derived_domain().unwrap();
    let options = OperationOptions::on(&derived).saving().completing_on_root();
    let record = insert_routed(&corral, options).unwrap();
    assert_eq!(record.owner(), corral.root_domain().id());
    assert_eq!(record.attribute("reg_no"), Some(&Value::Integer(10)));
}

#[test]
fn read_routing_only_redispatches_explicit_root_delivery() {
    let corral = open_in_memory();
    let derived = corral.new_derived_domain().unwrap();
    let saved = corral.insert_with("Person", person(10), true, None);

    let (tx, rx) = mpsc::channel();
    let options = OperationOptions::on(&derived);
    corral.fetch_by_id_async(&saved.id, options, {
        let tx = tx.clone();
        move |record| tx.send(record).unwrap()
    });
    let local = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(local.owner(), derived.id());

    let options = OperationOptions::on(&derived).completing_on_root();
    corral.fetch_by_id_async(&saved.id, options, move |record| tx.send(record).unwrap());
    let rerouted = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(rerouted.owner(), corral.root_domain().id());
}

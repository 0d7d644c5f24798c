//! Capability differences between the store kinds.

use corral_core::{
    AggregateFunction, AttributeKind, AttributeMap, Corral, CorralConfig, EntityDescriptor, Model,
    Predicate, StoreKind, Value,
};

fn model() -> Model {
    Model::new(vec![EntityDescriptor::new("Person")
        .with_attribute("name", AttributeKind::Text)
        .with_attribute("reg_no", AttributeKind::Integer)])
}

fn open(kind: StoreKind, dir: &tempfile::TempDir) -> Corral {
    let config = CorralConfig::new(model(), kind)
        .with_database_file_name("people")
        .with_store_dir(dir.path());
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
fn binary_store_survives_a_session_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = open(StoreKind::Binary, &dir);
    let record = first.insert_with("Person", person("ada", 10), true, None);
    drop(first);

    let second = open(StoreKind::Binary, &dir);
    let fetched = second.fetch_by_id(&record.id, None).unwrap();
    assert_eq!(fetched.attribute("name"), Some(&Value::Text("ada".into())));
    assert_eq!(second.count("Person", &Predicate::All, None), 1);
}

#[test]
fn sqlite_store_survives_a_session_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = open(StoreKind::Sqlite, &dir);
    let record = first.insert_with("Person", person("ada", 10), true, None);
    drop(first);

    let second = open(StoreKind::Sqlite, &dir);
    assert!(second.fetch_by_id(&record.id, None).is_some());
}

#[test]
fn sqlite_aggregate_and_update_all_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let corral = open(StoreKind::Sqlite, &dir);
    corral.insert_with("Person", person("a", 10), true, None);
    corral.insert_with("Person", person("b", 20), true, None);
    corral.insert_with("Person", person("c", 40), true, None);

    let sum = corral
        .aggregate(AggregateFunction::Sum, "Person", "reg_no", &Predicate::All, None)
        .unwrap();
    assert_eq!(sum.get("reg_no"), Some(&Value::Integer(70)));

    assert!(corral.update_all(
        "Person",
        &Predicate::All,
        [("reg_no".to_string(), Value::Integer(30))].into(),
        true,
        None,
    ));
    assert_eq!(corral.count("Person", &Predicate::eq("reg_no", 30), None), 3);
}

#[test]
fn sqlite_min_max_and_average_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let corral = open(StoreKind::Sqlite, &dir);
    corral.insert_with("Person", person("a", 10), true, None);
    corral.insert_with("Person", person("b", 25), true, None);

    let min = corral
        .aggregate(AggregateFunction::Min, "Person", "reg_no", &Predicate::All, None)
        .unwrap();
    assert_eq!(min.get("reg_no"), Some(&Value::Integer(10)));

    let max = corral
        .aggregate(AggregateFunction::Max, "Person", "reg_no", &Predicate::All, None)
        .unwrap();
    assert_eq!(max.get("reg_no"), Some(&Value::Integer(25)));

    let average = corral
        .aggregate(
            AggregateFunction::Average,
            "Person",
            "reg_no",
            &Predicate::All,
            None,
        )
        .unwrap();
    match average.get("reg_no") {
        Some(Value::Real(value)) => assert!((value - 17.5).abs() < 1e-9),
        other => panic!("expected real average, got {other:?}"),
    }
}

#[test]
fn failed_save_is_reported_through_mutation_results() {
    let dir = tempfile::tempdir().unwrap();
    let corral = open(StoreKind::Binary, &dir);
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    // Occupying the store directory's path with a plain file makes every
    // later snapshot write fail.
    std::fs::remove_dir_all(dir.path()).unwrap();
    std::fs::File::create(dir.path()).unwrap();

    assert!(!corral.update_by_id(
        &record.id,
        [("reg_no".to_string(), Value::Integer(11))].into(),
        true,
        None,
    ));
    assert!(!corral.delete_by_id(&record.id, true, None));
    // The mutations stay pending, nothing was committed.
    assert!(corral.has_changes(None));
}

#[test]
fn failed_save_is_reported_through_async_mutation_results() {
    let dir = tempfile::tempdir().unwrap();
    let corral = open(StoreKind::Binary, &dir);
    let record = corral.insert_with("Person", person("ada", 10), true, None);

    std::fs::remove_dir_all(dir.path()).unwrap();
    std::fs::File::create(dir.path()).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    corral.delete_by_id_async(
        &record.id,
        corral_core::OperationOptions::default().saving(),
        move |deleted| {
            let _ = tx.send(deleted);
        },
    );
    let deleted = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .unwrap();
    assert!(!deleted);
}

#[test]
fn purge_removes_the_database_files() {
    let dir = tempfile::tempdir().unwrap();
    let corral = open(StoreKind::Sqlite, &dir);
    corral.insert_with("Person", person("ada", 10), true, None);

    let db_path = dir.path().join("people.sqlite");
    assert!(db_path.exists());
    assert!(corral.purge_store());
    assert!(!db_path.exists());
}

#[test]
fn purge_is_refused_for_the_in_memory_kind() {
    let corral = Corral::open(CorralConfig::new(model(), StoreKind::InMemory)).unwrap();
    corral.insert_with("Person", person("ada", 10), true, None);
    assert!(!corral.purge_store());
    assert_eq!(corral.count("Person", &Predicate::All, None), 1);
}

#[test]
fn file_backed_kinds_require_a_store_directory() {
    let config = CorralConfig::new(model(), StoreKind::Sqlite);
    assert!(Corral::open(config).is_err());
}

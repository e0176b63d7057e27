use tl_core::model::EventContext;
use tl_storage::{CreateTaskRequest, StoreError, TaskStore};

fn open_store() -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(dir.path()).unwrap();
    (dir, store)
}

fn ctx() -> EventContext {
    EventContext::default()
}

fn create(store: &mut TaskStore, title: &str) -> String {
    store
        .create_task(CreateTaskRequest {
            title: title.to_string(),
            project: "graph".to_string(),
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id
}

#[test]
fn reverse_edge_is_rejected_and_leaves_the_table_untouched() {
    let (_dir, mut store) = open_store();
    let a = create(&mut store, "A");
    let b = create(&mut store, "B");

    store.add_dependency(&b, &a, &ctx()).unwrap();

    let err = store.add_dependency(&a, &b, &ctx()).unwrap_err();
    match err {
        StoreError::DependencyCycle { path } => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&a) && path.contains(&b));
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }

    assert_eq!(store.get_task(&b).unwrap().depends_on, vec![a.clone()]);
    assert!(store.get_task(&a).unwrap().depends_on.is_empty());
}

#[test]
fn self_dependency_is_rejected() {
    let (_dir, mut store) = open_store();
    let a = create(&mut store, "A");
    let err = store.add_dependency(&a, &a, &ctx()).unwrap_err();
    assert!(matches!(err, StoreError::DependencyCycle { .. }));
}

#[test]
fn longer_cycles_are_caught() {
    let (_dir, mut store) = open_store();
    let a = create(&mut store, "A");
    let b = create(&mut store, "B");
    let c = create(&mut store, "C");

    store.add_dependency(&b, &a, &ctx()).unwrap();
    store.add_dependency(&c, &b, &ctx()).unwrap();

    let err = store.add_dependency(&a, &c, &ctx()).unwrap_err();
    match err {
        StoreError::DependencyCycle { path } => {
            assert_eq!(path.first(), Some(&a));
            assert_eq!(path.last(), Some(&a));
            assert_eq!(path.len(), 4);
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
}

#[test]
fn validate_stays_clean_under_adversarial_adds() {
    let (_dir, mut store) = open_store();
    let ids: Vec<String> = (0..6).map(|i| create(&mut store, &format!("n{i}"))).collect();

    // Try every ordered pair, in a shuffled-ish order; rejected edges must
    // never land in the table.
    for step in 0..(ids.len() * ids.len()) {
        let from = (step * 7 + 3) % ids.len();
        let to = (step * 5 + 1) % ids.len();
        let _ = store.add_dependency(&ids[from], &ids[to], &ctx());
    }

    assert!(store.validate().unwrap().cycles.is_empty());
}

#[test]
fn orphan_edges_are_accepted_at_create() {
    let (_dir, mut store) = open_store();
    let id = store
        .create_task(CreateTaskRequest {
            title: "depends on nothing yet".to_string(),
            project: "graph".to_string(),
            depends_on: vec!["future-task".to_string()],
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id;

    assert_eq!(
        store.get_task(&id).unwrap().depends_on,
        vec!["future-task".to_string()]
    );
    assert!(store.validate().unwrap().cycles.is_empty());
}

#[test]
fn remove_dependency_deletes_the_edge() {
    let (_dir, mut store) = open_store();
    let a = create(&mut store, "A");
    let b = create(&mut store, "B");

    store.add_dependency(&b, &a, &ctx()).unwrap();
    store.remove_dependency(&b, &a, &ctx()).unwrap();
    assert!(store.get_task(&b).unwrap().depends_on.is_empty());

    // Removing a non-existent edge is a quiet no-op with no event.
    let before = store.max_event_seq().unwrap();
    store.remove_dependency(&b, &a, &ctx()).unwrap();
    assert_eq!(store.max_event_seq().unwrap(), before);

    // And the old reverse restriction is gone.
    store.add_dependency(&a, &b, &ctx()).unwrap();
    assert_eq!(store.get_task(&a).unwrap().depends_on, vec![b.clone()]);
}

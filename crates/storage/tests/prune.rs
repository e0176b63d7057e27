use tl_core::model::{EventContext, TaskStatus};
use tl_storage::{ClaimOptions, CreateTaskRequest, StoreError, TaskStore};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn open_store() -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(dir.path()).unwrap();
    (dir, store)
}

fn ctx() -> EventContext {
    EventContext::default()
}

fn create(store: &mut TaskStore, title: &str, parent: Option<&str>) -> String {
    store
        .create_task(CreateTaskRequest {
            title: title.to_string(),
            project: "ops".to_string(),
            parent_id: parent.map(str::to_string),
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id
}

fn finish(store: &mut TaskStore, id: &str) {
    store.set_status(id, TaskStatus::Ready, &ctx()).unwrap();
    store.claim(id, &ClaimOptions::default()).unwrap();
    store.complete(id, &ctx()).unwrap();
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[test]
fn prunes_a_fully_terminal_family_together() {
    let (dir, mut store) = open_store();
    let parent = create(&mut store, "parent", None);
    let kid_a = create(&mut store, "kid a", Some(&parent));
    let kid_b = create(&mut store, "kid b", Some(&parent));
    let survivor = create(&mut store, "survivor", None);

    finish(&mut store, &kid_a);
    finish(&mut store, &kid_b);
    store.archive(&parent, None, &ctx()).unwrap();

    // Pretend a week has passed since the terminal timestamps.
    let as_of = now_ms() + 8 * DAY_MS;
    let report = store
        .prune_eligible(Some("ops"), 7 * DAY_MS, Some(as_of))
        .unwrap();
    let mut pruned = report.tasks.clone();
    pruned.sort();
    let mut expected = vec![parent.clone(), kid_a.clone(), kid_b.clone()];
    expected.sort();
    assert_eq!(pruned, expected);
    assert!(report.events_deleted > 0);

    for id in [&parent, &kid_a, &kid_b] {
        assert!(matches!(
            store.get_task(id).unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(store.events_by_task(id).unwrap().is_empty());
    }
    assert!(store.get_task(&survivor).is_ok());

    // The append-only guard is still armed for everything that remains.
    drop(store);
    let raw = rusqlite::Connection::open(dir.path().join("taskledger.db")).unwrap();
    let err = raw.execute("DELETE FROM events", []).unwrap_err();
    assert!(err.to_string().contains("append-only"));
}

#[test]
fn family_with_a_live_member_is_held_back() {
    let (_dir, mut store) = open_store();
    let parent = create(&mut store, "parent", None);
    let done_kid = create(&mut store, "done kid", Some(&parent));
    let live_kid = create(&mut store, "live kid", Some(&parent));

    finish(&mut store, &done_kid);
    store.archive(&parent, None, &ctx()).unwrap();
    store.set_status(&live_kid, TaskStatus::Ready, &ctx()).unwrap();

    let as_of = now_ms() + 8 * DAY_MS;
    assert!(store
        .preview_prunable(None, 7 * DAY_MS, Some(as_of))
        .unwrap()
        .is_empty());

    finish(&mut store, &live_kid);
    let eligible = store
        .preview_prunable(None, 0, Some(now_ms() + DAY_MS))
        .unwrap();
    assert_eq!(eligible.len(), 3);
}

#[test]
fn family_waits_for_its_slowest_member() {
    let (_dir, mut store) = open_store();
    let parent = create(&mut store, "parent", None);
    let kid = create(&mut store, "kid", Some(&parent));

    store.archive(&parent, None, &ctx()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(60));
    finish(&mut store, &kid);

    // The parent went terminal well before the kid. A threshold sitting
    // between the two ages must not peel the parent off on its own.
    let report = store.prune_eligible(None, 30, None).unwrap();
    assert!(report.tasks.is_empty());
    assert!(store.get_task(&parent).is_ok());
    assert!(store.get_task(&kid).is_ok());

    // Once the kid clears the threshold too, the family goes as a unit.
    let report = store
        .prune_eligible(None, 0, Some(now_ms() + DAY_MS))
        .unwrap();
    let mut pruned = report.tasks.clone();
    pruned.sort();
    let mut expected = vec![parent.clone(), kid.clone()];
    expected.sort();
    assert_eq!(pruned, expected);
    assert!(store.preview_prunable(None, 0, Some(now_ms() + DAY_MS)).unwrap().is_empty());
}

#[test]
fn non_terminal_dependents_block_pruning_across_projects() {
    let (_dir, mut store) = open_store();
    let dep = create(&mut store, "library task", None);
    finish(&mut store, &dep);

    let dependent = store
        .create_task(CreateTaskRequest {
            title: "consumer".to_string(),
            project: "another-project".to_string(),
            depends_on: vec![dep.clone()],
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id;

    let as_of = now_ms() + 8 * DAY_MS;
    assert!(store
        .preview_prunable(None, 7 * DAY_MS, Some(as_of))
        .unwrap()
        .is_empty());

    finish(&mut store, &dependent);
    let eligible = store
        .preview_prunable(None, 0, Some(now_ms() + DAY_MS))
        .unwrap();
    assert_eq!(eligible.len(), 2);
}

#[test]
fn age_threshold_is_respected() {
    let (_dir, mut store) = open_store();
    let id = create(&mut store, "too fresh", None);
    finish(&mut store, &id);

    // Terminal just now: not old enough for a 7 day threshold.
    assert!(store
        .preview_prunable(None, 7 * DAY_MS, Some(now_ms()))
        .unwrap()
        .is_empty());
    let report = store.prune_eligible(None, 7 * DAY_MS, None).unwrap();
    assert!(report.tasks.is_empty());
    assert_eq!(report.events_deleted, 0);
}

#[test]
fn split_mode_prune_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TaskStore::open_split(dir.path()).unwrap();
    let doomed = create(&mut store, "doomed", None);
    let keeper = create(&mut store, "keeper", None);
    finish(&mut store, &doomed);

    let as_of = now_ms() + 8 * DAY_MS;
    let report = store
        .prune_eligible(None, 7 * DAY_MS, Some(as_of))
        .unwrap();
    assert_eq!(report.tasks, vec![doomed.clone()]);

    // The journal is gone once the prune finishes cleanly.
    assert!(!dir.path().join("prune_journal.json").exists());

    drop(store);
    let store = TaskStore::open_split(dir.path()).unwrap();
    assert!(matches!(
        store.get_task(&doomed).unwrap_err(),
        StoreError::NotFound { .. }
    ));
    assert!(store.get_task(&keeper).is_ok());
}

#[test]
fn leftover_journal_is_replayed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TaskStore::open_split(dir.path()).unwrap();
    let half_pruned = create(&mut store, "half pruned", None);
    let untouched = create(&mut store, "untouched", None);
    finish(&mut store, &half_pruned);
    drop(store);

    // Simulate a crash after the journal was persisted but before the
    // cleanup finished.
    std::fs::write(
        dir.path().join("prune_journal.json"),
        serde_json::json!({ "tasks": [&half_pruned] }).to_string(),
    )
    .unwrap();

    let store = TaskStore::open_split(dir.path()).unwrap();
    assert!(matches!(
        store.get_task(&half_pruned).unwrap_err(),
        StoreError::NotFound { .. }
    ));
    assert!(store.events_by_task(&half_pruned).unwrap().is_empty());
    assert!(store.get_task(&untouched).is_ok());
}

use tl_core::model::{EventContext, TaskStatus};
use tl_storage::{ClaimOptions, CreateTaskRequest, TaskStore};

fn open_store() -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(dir.path()).unwrap();
    (dir, store)
}

fn ctx() -> EventContext {
    EventContext {
        author: Some("exporter".to_string()),
        ..Default::default()
    }
}

fn populate(store: &mut TaskStore) -> Vec<String> {
    let a = store
        .create_task(CreateTaskRequest {
            title: "Déployer la mise à jour 🚀".to_string(),
            project: "intl".to_string(),
            description: Some("включая юникод".to_string()),
            tags: vec!["досье".to_string()],
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id;
    let b = store
        .create_task(CreateTaskRequest {
            title: "日本語のタスク".to_string(),
            project: "intl".to_string(),
            context: ctx(),
            ..Default::default()
        })
        .unwrap()
        .id;
    store.set_status(&a, TaskStatus::Ready, &ctx()).unwrap();
    store.claim(&a, &ClaimOptions::default()).unwrap();
    store.add_comment(&a, "ça marche 👍", &ctx()).unwrap();
    store.complete(&a, &ctx()).unwrap();
    vec![a, b]
}

#[test]
fn unicode_round_trip_reproduces_identical_snapshots() {
    let (_dir, mut source) = open_store();
    let ids = populate(&mut source);

    let mut buf = Vec::new();
    let exported = source.export_events(&mut buf).unwrap();
    assert_eq!(exported as i64, source.max_event_seq().unwrap());

    let (_dir2, mut target) = open_store();
    let report = target.import_events(buf.as_slice()).unwrap();
    assert_eq!(report.imported, exported);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.malformed, 0);

    target.rebuild_all().unwrap();

    assert_eq!(
        source.list_tasks(None, None).unwrap(),
        target.list_tasks(None, None).unwrap()
    );
    assert_eq!(source.comments(&ids[0]).unwrap(), target.comments(&ids[0]).unwrap());
}

#[test]
fn second_import_skips_everything() {
    let (_dir, mut source) = open_store();
    populate(&mut source);

    let mut buf = Vec::new();
    let exported = source.export_events(&mut buf).unwrap();

    let (_dir2, mut target) = open_store();
    target.import_events(buf.as_slice()).unwrap();
    let report = target.import_events(buf.as_slice()).unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped, exported);
    assert_eq!(report.malformed, 0);
}

#[test]
fn malformed_lines_are_counted_not_fatal() {
    let (_dir, mut source) = open_store();
    populate(&mut source);

    let mut buf = Vec::new();
    let exported = source.export_events(&mut buf).unwrap();
    buf.extend_from_slice(b"this is not json\n");
    buf.extend_from_slice(b"{\"also\": \"not an event\"}\n");

    let (_dir2, mut target) = open_store();
    let report = target.import_events(buf.as_slice()).unwrap();
    assert_eq!(report.imported, exported);
    assert_eq!(report.malformed, 2);
}

#[test]
fn export_is_ordered_by_sequence() {
    let (_dir, mut source) = open_store();
    populate(&mut source);

    let mut buf = Vec::new();
    source.export_events(&mut buf).unwrap();

    let seqs: Vec<i64> = String::from_utf8(buf)
        .unwrap()
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["seq"].as_i64().unwrap()
        })
        .collect();
    let mut sorted = seqs.clone();
    sorted.sort();
    assert_eq!(seqs, sorted);
    assert!(!seqs.is_empty());
}

#[test]
fn search_finds_indexed_unicode_text() {
    let (_dir, mut store) = open_store();
    populate(&mut store);

    let hits = store.search_tasks("юникод", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, "description");

    let hits = store.search_tasks("ça marche", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, "comment");

    assert!(store.search_tasks("nothing like this", 10).unwrap().is_empty());
}

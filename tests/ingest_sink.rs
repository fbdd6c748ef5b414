// tests/ingest_sink.rs
use crisis_crawler::{CsvStore, IngestedRecord, RecordSink};
use std::fs::{self, OpenOptions};
use std::io::Write;

fn rec(id: &str) -> IngestedRecord {
    IngestedRecord {
        id: id.into(),
        timestamp: 1_699_000_000.0,
        content: "feeling overwhelmed".into(),
        likes: 5,
        shares: 0,
        comments: 1,
        comments_text: vec!["hang in there".into(), "dm me, \"anytime\"".into()],
    }
}

#[test]
fn interrupted_append_is_rolled_back_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.csv");

    let mut store = CsvStore::open(&path).unwrap();
    store.append(&[rec("a"), rec("b")]).unwrap();
    let committed = fs::metadata(&path).unwrap().len();
    drop(store);

    // Simulate a crash halfway through the next batch: marker written,
    // one full row plus a torn one on disk, marker never removed.
    fs::write(dir.path().join("posts.csv.pending"), committed.to_string()).unwrap();
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(b"c,1699000000.0,x,1,0,0,[]\nd,16990").unwrap();
    drop(f);

    let store = CsvStore::open(&path).unwrap();
    let ids = store.load_existing_ids().unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("a") && ids.contains("b"));
    assert!(!ids.contains("c"));
    assert_eq!(fs::metadata(&path).unwrap().len(), committed);
    assert!(!dir.path().join("posts.csv.pending").exists());
}

#[test]
fn rows_round_trip_with_quoted_comment_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.csv");
    let mut store = CsvStore::open(&path).unwrap();
    store.append(&[rec("a")]).unwrap();

    let rows = store.read_all().unwrap();
    assert_eq!(rows, vec![rec("a")]);
}

#[test]
fn empty_batch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.csv");
    let mut store = CsvStore::open(&path).unwrap();
    store.append(&[]).unwrap();
    assert!(!path.exists());
}

#[test]
fn append_after_hand_edit_without_trailing_newline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.csv");
    fs::write(
        &path,
        "id,timestamp,content,likes,shares,comments,comments_text\nz,1.0,old,0,0,0,[]",
    )
    .unwrap();

    let mut store = CsvStore::open(&path).unwrap();
    store.append(&[rec("a")]).unwrap();
    let ids = store.load_existing_ids().unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("z"));
}

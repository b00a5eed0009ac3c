mod common;

use common::held_db;
use querylite::promise::SlotStatus;
use querylite::snapshot::Source;
use querylite::QueryError;
use std::sync::{Arc, Barrier};
use std::thread;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn double_get_issues_one_execution() {
    let (db, exec) = held_db();
    let q = db.collection("people").unwrap().where_equal_to("team", "red").unwrap();
    let first = q.get(Source::Default);
    let second = q.get(Source::Default);
    assert_eq!(exec.execute_count(), 1);
    assert!(first.same_slot(&second));
    exec.release_all();
    assert!(first.wait().unwrap().is_empty());
    assert!(second.wait().unwrap().is_empty());
}

#[test]
fn get_after_completion_starts_new_work() {
    let (db, exec) = held_db();
    let q = db.collection("people").unwrap();
    let first = q.get(Source::Default);
    exec.release_all();
    first.wait().unwrap();
    let second = q.get(Source::Server);
    assert!(!first.same_slot(&second));
    assert_eq!(exec.execute_count(), 1);
    assert_eq!(exec.executions.lock()[0].1, Source::Server);
}

#[test]
fn separate_queries_do_not_share_slots() {
    let (db, exec) = held_db();
    let col = db.collection("people").unwrap();
    let a = col.limit(1).unwrap();
    let b = col.limit(1).unwrap();
    assert_eq!(a, b);
    let _ra = a.get(Source::Default);
    let _rb = b.get(Source::Default);
    assert_eq!(exec.execute_count(), 2);
}

#[test]
fn drop_with_pending_get_suppresses_late_completion() {
    let (db, exec) = held_db();
    let q = db.collection("people").unwrap().limit(3).unwrap();
    let result = q.get(Source::Default);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    result.on_completion(move |r| {
        assert!(matches!(r, Err(QueryError::Abandoned)));
        h.fetch_add(1, Ordering::SeqCst);
    });
    drop(q);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(result.status(), SlotStatus::Abandoned);
    exec.release_all();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(matches!(result.wait(), Err(QueryError::Abandoned)));
    assert_eq!(db.promises().pending_count(), 0);
}

#[test]
fn execution_error_arrives_through_result() {
    let (db, exec) = held_db();
    let q = db.collection("people").unwrap();
    let result = q.get(Source::Cache);
    let (_, _, resolver) = exec.executions.lock().remove(0);
    resolver.fail(QueryError::ExecutionFailed("offline".into()));
    assert!(matches!(result.wait(), Err(QueryError::ExecutionFailed(m)) if m == "offline"));
}

#[test]
fn add_and_get_use_distinct_kinds_on_one_owner() {
    let (db, exec) = held_db();
    let col = db.collection("people").unwrap();
    let read = col.get(Source::Default);
    let first = col.add(bson::doc! {"n": 1});
    let second = col.add(bson::doc! {"n": 2});
    assert!(!first.same_slot(&second));
    assert_eq!(exec.execute_count(), 1);
    assert_eq!(exec.adds.lock().len(), 2);
    assert_eq!(col.add_status(), Some(SlotStatus::Pending));

    let adds: Vec<_> = exec.adds.lock().drain(..).collect();
    for (i, (path, _, resolver)) in adds.into_iter().enumerate() {
        let key = querylite::DocumentKey::in_collection(&path, &format!("id{i}")).unwrap();
        resolver.resolve(key);
    }
    assert_eq!(first.wait().unwrap().path(), "people/id0");
    assert_eq!(second.wait().unwrap().id(), "id1");
    assert!(read.is_pending());
    drop(col);
    assert!(matches!(read.wait_timeout(Duration::from_secs(1)), Some(Err(QueryError::Abandoned))));
}

#[test]
fn dropping_collection_abandons_pending_add() {
    let (db, exec) = held_db();
    let col = db.collection("people").unwrap();
    let added = col.add(bson::doc! {"n": 1});
    drop(col);
    assert!(matches!(added.wait(), Err(QueryError::Abandoned)));
    let (path, _, resolver) = exec.adds.lock().remove(0);
    assert!(!resolver.is_live());
    resolver.resolve(querylite::DocumentKey::in_collection(&path, "late").unwrap());
    assert!(matches!(added.result(), Some(Err(QueryError::Abandoned))));
}

#[test]
fn pending_count_tracks_outstanding_gets() {
    let (db, exec) = held_db();
    let q = db.collection("people").unwrap();
    let _r = q.get(Source::Default);
    assert_eq!(db.promises().pending_count(), 1);
    exec.release_all();
    assert_eq!(db.promises().pending_count(), 0);
}

#[tokio::test]
async fn results_can_be_awaited() {
    let (db, exec) = common::memory_db();
    exec.insert("people", "a", bson::doc! {"age": 1}).unwrap();
    let q = db.collection("people").unwrap();
    let snap = q.get(Source::Default).await.unwrap();
    assert_eq!(snap.ids(), vec!["a".to_string()]);
    let added = q.add(bson::doc! {"age": 2}).await.unwrap();
    assert_eq!(exec.document(added.key()), Some(bson::doc! {"age": 2}));
}

#[test]
fn concurrent_gets_share_one_execution() {
    const THREADS: usize = 16;
    let (db, exec) = held_db();
    let q = Arc::new(db.collection("people").unwrap().where_equal_to("team", "blue").unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let q = Arc::clone(&q);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                q.get(Source::Default)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(exec.execute_count(), 1);
    assert!(results.iter().all(|r| r.same_slot(&results[0])));
    exec.release_all();
    for r in results {
        assert!(r.wait().unwrap().is_empty());
    }
}

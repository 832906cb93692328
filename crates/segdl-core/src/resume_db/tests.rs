//! Tests for resume_db (use in-memory DB helper from db).

use crate::resume_db::db::open_memory;
use crate::resume_db::{ChunkRecord, NewTask, TaskState};

fn chunks(total: u64, parts: u64) -> Vec<ChunkRecord> {
    let size = total / parts;
    (0..parts)
        .map(|i| ChunkRecord {
            index: i as u32,
            start: i * size,
            downloaded: 0,
            length: Some(if i == parts - 1 { total - i * size } else { size }),
        })
        .collect()
}

#[tokio::test]
async fn insert_and_get_task() {
    let db = open_memory().await.unwrap();
    let new = NewTask::new("https://example.com/file.bin", "/tmp/dl")
        .header("Authorization", "Bearer x")
        .speed_limit(4096);
    let id = db.insert_task(&new, TaskState::Pending).await.unwrap();

    let rec = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(rec.url, "https://example.com/file.bin");
    assert_eq!(rec.dest_dir, std::path::PathBuf::from("/tmp/dl"));
    assert_eq!(rec.filename, None);
    assert_eq!(rec.headers.get("Authorization").map(String::as_str), Some("Bearer x"));
    assert_eq!(rec.total_size, None);
    assert_eq!(rec.state, TaskState::Pending);
    assert_eq!(rec.speed_limit, Some(4096));
    assert!(rec.created_at > 0);

    assert!(db.get_task(id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn save_replaces_plan_and_load_returns_it() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_task(&NewTask::new("https://example.com/a", "/tmp"), TaskState::Pending)
        .await
        .unwrap();
    let mut rec = db.get_task(id).await.unwrap().unwrap();
    rec.filename = Some("a.bin".into());
    rec.total_size = Some(1000);
    rec.resumable = true;
    rec.etag = Some("v1".into());
    rec.state = TaskState::Running;
    db.save(&rec, &chunks(1000, 4)).await.unwrap();

    let (loaded, plan) = db.load(id).await.unwrap().unwrap();
    assert_eq!(loaded, rec);
    assert_eq!(plan, chunks(1000, 4));

    // A second save with a different plan replaces the first.
    db.save(&rec, &chunks(1000, 2)).await.unwrap();
    assert_eq!(db.load_chunks(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn save_progress_updates_chunks_and_total() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_task(&NewTask::new("https://example.com/a", "/tmp"), TaskState::Running)
        .await
        .unwrap();
    let rec = db.get_task(id).await.unwrap().unwrap();
    let mut plan = chunks(1000, 2);
    db.save(&rec, &plan).await.unwrap();

    plan[0].downloaded = 300;
    plan[1].downloaded = 120;
    db.save_progress(id, &plan, 420).await.unwrap();

    let (rec, loaded) = db.load(id).await.unwrap().unwrap();
    assert_eq!(rec.downloaded_size, 420);
    assert_eq!(loaded[0].downloaded, 300);
    assert_eq!(loaded[1].downloaded, 120);
    assert_eq!(loaded[1].next_offset(), 620);
}

#[tokio::test]
async fn unknown_size_persists_as_none() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_task(&NewTask::new("https://example.com/s", "/tmp"), TaskState::Running)
        .await
        .unwrap();
    let rec = db.get_task(id).await.unwrap().unwrap();
    let plan = vec![ChunkRecord {
        index: 0,
        start: 0,
        downloaded: 77,
        length: None,
    }];
    db.save(&rec, &plan).await.unwrap();
    let (rec, loaded) = db.load(id).await.unwrap().unwrap();
    assert_eq!(rec.total_size, None);
    assert_eq!(loaded, plan);
}

#[tokio::test]
async fn recover_interrupted_requeues_in_flight_tasks() {
    let db = open_memory().await.unwrap();
    let mut ids = Vec::new();
    for st in [
        TaskState::Running,
        TaskState::Connecting,
        TaskState::Pausing,
        TaskState::Paused,
        TaskState::Finish,
    ] {
        let id = db
            .insert_task(&NewTask::new(format!("https://e.com/{st}"), "/tmp"), st)
            .await
            .unwrap();
        ids.push(id);
    }
    let n = db.recover_interrupted().await.unwrap();
    assert_eq!(n, 3);

    let state = |i: usize| {
        let db = db.clone();
        let id = ids[i];
        async move { db.get_task(id).await.unwrap().unwrap().state }
    };
    assert_eq!(state(0).await, TaskState::Waiting);
    assert_eq!(state(1).await, TaskState::Waiting);
    assert_eq!(state(2).await, TaskState::Paused);
    assert_eq!(state(3).await, TaskState::Paused);
    assert_eq!(state(4).await, TaskState::Finish);
}

#[tokio::test]
async fn list_filters_and_orders() {
    let db = open_memory().await.unwrap();
    let a = db
        .insert_task(&NewTask::new("https://e.com/a", "/tmp"), TaskState::Waiting)
        .await
        .unwrap();
    let b = db
        .insert_task(&NewTask::new("https://e.com/b", "/tmp"), TaskState::Canceled)
        .await
        .unwrap();
    let c = db
        .insert_task(&NewTask::new("https://e.com/c", "/tmp"), TaskState::Paused)
        .await
        .unwrap();

    let all = db.list_tasks().await.unwrap();
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a, b, c]);

    let active = db
        .list_in_states(&[TaskState::Waiting, TaskState::Paused])
        .await
        .unwrap();
    assert_eq!(active.iter().map(|t| t.id).collect::<Vec<_>>(), vec![c, a]);
    assert!(db.list_in_states(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn finished_listing_uses_finish_time() {
    let db = open_memory().await.unwrap();
    let mut ids = Vec::new();
    for (name, finished_at) in [("x", 2_000), ("y", 3_000), ("z", 1_000)] {
        let id = db
            .insert_task(&NewTask::new(format!("https://e.com/{name}"), "/tmp"), TaskState::Pending)
            .await
            .unwrap();
        let mut rec = db.get_task(id).await.unwrap().unwrap();
        rec.state = TaskState::Finish;
        rec.finished_at = Some(finished_at);
        db.save_record(&rec).await.unwrap();
        ids.push(id);
    }
    let done = db.list_finished().await.unwrap();
    assert_eq!(
        done.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![ids[1], ids[0], ids[2]]
    );
}

#[tokio::test]
async fn delete_removes_task_and_chunks() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_task(&NewTask::new("https://e.com/d", "/tmp"), TaskState::Paused)
        .await
        .unwrap();
    let rec = db.get_task(id).await.unwrap().unwrap();
    db.save(&rec, &chunks(100, 2)).await.unwrap();

    db.delete_chunks(id).await.unwrap();
    assert!(db.load_chunks(id).await.unwrap().is_empty());
    assert!(db.get_task(id).await.unwrap().is_some());

    db.save(&rec, &chunks(100, 2)).await.unwrap();
    db.delete(id).await.unwrap();
    assert!(db.load(id).await.unwrap().is_none());
    assert!(db.load_chunks(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn set_state_only_touches_state() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_task(&NewTask::new("https://e.com/s", "/tmp").filename("s.bin"), TaskState::Waiting)
        .await
        .unwrap();
    db.set_state(id, TaskState::Paused).await.unwrap();
    let rec = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(rec.state, TaskState::Paused);
    assert_eq!(rec.filename.as_deref(), Some("s.bin"));
}

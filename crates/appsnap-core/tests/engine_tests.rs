//! End-to-end behavior of the engine against real app directories.

use appsnap_core::{
    ChangeKind, CoreError, Engine, EngineConfig, FileContent, ProjectItem, RetryPolicy,
    SnapshotError,
};
use appsnap_test_utils::assertions::{assert_changes, assert_file_equals, assert_missing};
use appsnap_test_utils::{FailingSubscriber, RecordingSubscriber, ScriptedGenerator, TestApp};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 1,
        backoff_factor: 2,
        max_delay_ms: 5,
    }
}

#[tokio::test]
async fn rewind_notifies_subscribers_of_every_changed_file() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let first = engine.current_snapshot(app.id()).await.unwrap().unwrap();

    app.write_file("a.txt", "2");
    app.write_file("b.txt", "x");
    engine.commit(app.id(), "second").await.unwrap();

    let viewer = RecordingSubscriber::new();
    engine.subscribe(app.id(), viewer.handle()).await.unwrap();

    let changes = engine.checkout(app.id(), first.as_str()).await.unwrap();
    engine.flush(app.id()).await.unwrap();

    assert_changes(&changes, &[], &["a.txt"], &["b.txt"]);
    assert_file_equals(&app.path().join("a.txt"), "1");
    assert_missing(&app.path().join("b.txt"));

    let rewound = viewer.last_for("a.txt").unwrap();
    assert_eq!(rewound.kind, ChangeKind::Modified);
    assert_eq!(rewound.content, Some(FileContent::Utf8("1".to_string())));

    let removed = viewer.last_for("b.txt").unwrap();
    assert_eq!(removed.kind, ChangeKind::Deleted);
    assert!(removed.content.is_none());
    assert_eq!(viewer.events().len(), 2);
}

#[tokio::test]
async fn commit_notifies_changes_since_previous_snapshot() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let viewer = RecordingSubscriber::new();
    engine.subscribe(app.id(), viewer.handle()).await.unwrap();

    app.write_file("src/app.js", "run()");
    engine.commit(app.id(), "add script").await.unwrap();
    engine.flush(app.id()).await.unwrap();

    assert_eq!(viewer.paths(), vec!["src/app.js"]);
    assert_eq!(viewer.events()[0].kind, ChangeKind::Added);
    assert_eq!(viewer.events()[0].app_id, app.id());
}

#[tokio::test]
async fn history_runs_from_current_snapshot_backwards() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let first = engine.current_snapshot(app.id()).await.unwrap().unwrap();

    app.write_file("a.txt", "2");
    let second = engine.commit(app.id(), "second").await.unwrap();

    let history = engine.history(app.id(), None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second);
    assert_eq!(history[0].message, "second");
    assert_eq!(history[1].id, first);

    // Rewinding moves the pointer; the later snapshot stays reachable.
    engine.checkout(app.id(), first.as_str()).await.unwrap();
    assert_eq!(engine.history(app.id(), None).await.unwrap().len(), 1);
    engine.checkout(app.id(), second.as_str()).await.unwrap();
    assert_file_equals(&app.path().join("a.txt"), "2");
}

#[tokio::test]
async fn history_and_pointer_survive_restart() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let (first, third) = {
        let engine = app.engine().await;
        let first = engine.current_snapshot(app.id()).await.unwrap().unwrap();
        app.write_file("a.txt", "2");
        engine.commit(app.id(), "second").await.unwrap();
        app.write_file("a.txt", "3");
        let third = engine.commit(app.id(), "third").await.unwrap();
        engine.checkout(app.id(), first.as_str()).await.unwrap();
        (first, third)
    };

    let engine = Engine::new(app.config());
    engine.open_app(app.id()).await.unwrap();

    assert_eq!(
        engine.current_snapshot(app.id()).await.unwrap(),
        Some(first.clone())
    );
    assert_eq!(engine.history(app.id(), None).await.unwrap().len(), 1);
    assert_file_equals(&app.path().join("a.txt"), "1");

    engine.checkout(app.id(), third.as_str()).await.unwrap();
    let history = engine.history(app.id(), None).await.unwrap();
    let messages: Vec<_> = history.iter().map(|s| s.message.as_str()).collect();
    assert_eq!(messages, vec!["third", "second", "Initial snapshot"]);
    assert_eq!(history[2].id, first);
    assert_file_equals(&app.path().join("a.txt"), "3");
}

#[tokio::test]
async fn apps_with_identical_content_get_distinct_snapshots() {
    let apps_dir = TempDir::new().unwrap();
    let engine = Engine::new(EngineConfig {
        apps_dir: Some(apps_dir.path().to_path_buf()),
        ..Default::default()
    });

    let first = engine.create_app("Twin").await.unwrap();
    let second = engine.create_app("Twin").await.unwrap();

    assert_ne!(
        engine.current_snapshot(&first.id).await.unwrap(),
        engine.current_snapshot(&second.id).await.unwrap()
    );
}

#[tokio::test]
async fn unknown_snapshot_leaves_tree_untouched() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let before = engine.current_snapshot(app.id()).await.unwrap();
    app.write_file("a.txt", "uncommitted");

    let err = engine.checkout(app.id(), "zzz").await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Snapshot(SnapshotError::UnknownSnapshot(_))
    ));
    assert_eq!(engine.current_snapshot(app.id()).await.unwrap(), before);
    assert_file_equals(&app.path().join("a.txt"), "uncommitted");
}

#[tokio::test]
async fn dirty_tree_is_set_aside_before_checkout() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let first = engine.current_snapshot(app.id()).await.unwrap().unwrap();

    app.write_file("a.txt", "2");
    engine.commit(app.id(), "second").await.unwrap();
    app.write_file("a.txt", "work in progress");
    app.write_file("scratch.txt", "notes");

    engine.checkout(app.id(), first.as_str()).await.unwrap();

    assert_file_equals(&app.path().join("a.txt"), "1");
    assert_missing(&app.path().join("scratch.txt"));
    assert!(engine.working_changes(app.id()).await.unwrap().is_empty());
    assert_eq!(engine.set_aside_entries(app.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn diff_and_file_reads_use_recorded_snapshots() {
    let app = TestApp::new().with_file("a.txt", "one\n").build();
    let engine = app.engine().await;
    let first = engine.current_snapshot(app.id()).await.unwrap().unwrap();

    app.write_file("a.txt", "two\n");
    app.write_file("b.txt", "new");
    let second = engine.commit(app.id(), "second").await.unwrap();

    let changes = engine
        .diff(app.id(), first.as_str(), second.as_str())
        .await
        .unwrap();
    assert_changes(&changes, &["b.txt"], &["a.txt"], &[]);

    let old = engine
        .read_file_at(app.id(), first.as_str(), "a.txt")
        .await
        .unwrap();
    assert_eq!(old, Some(b"one\n".to_vec()));
    assert_eq!(
        engine
            .read_file_at(app.id(), first.as_str(), "b.txt")
            .await
            .unwrap(),
        None
    );

    let patch = engine
        .file_diff(app.id(), first.as_str(), "a.txt")
        .await
        .unwrap();
    assert!(patch.contains("-one"));
    assert!(patch.contains("+two"));
}

#[tokio::test]
async fn same_app_operations_wait_for_the_exclusive_section() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let handle = engine.registry().get(app.id()).await.unwrap();

    let section = handle.exclusive(None).await.unwrap();
    app.write_file("a.txt", "2");
    let commit = engine.commit(app.id(), "blocked");
    tokio::pin!(commit);

    assert!(tokio::time::timeout(Duration::from_millis(100), &mut commit)
        .await
        .is_err());

    drop(section);
    commit.await.unwrap();
    assert_eq!(engine.history(app.id(), None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn different_apps_do_not_block_each_other() {
    let first = TestApp::new().with_id("app_first").with_file("a.txt", "1").build();
    let engine = first.engine().await;
    let second = engine.create_app("Second").await.unwrap();

    let handle = engine.registry().get(first.id()).await.unwrap();
    let _section = handle.exclusive(None).await.unwrap();

    tokio::fs::write(second.workdir.join("b.txt"), "x")
        .await
        .unwrap();
    let committed = tokio::time::timeout(
        Duration::from_secs(10),
        engine.commit(&second.id, "independent"),
    )
    .await;

    assert!(committed.unwrap().is_ok());
}

#[tokio::test]
async fn exclusive_section_wait_is_bounded_by_config() {
    let app = TestApp::new()
        .with_file("a.txt", "1")
        .with_config(EngineConfig {
            lock_timeout_ms: Some(50),
            ..Default::default()
        })
        .build();
    let engine = app.engine().await;
    let handle = engine.registry().get(app.id()).await.unwrap();
    let _section = handle.exclusive(None).await.unwrap();

    let err = engine.commit(app.id(), "late").await.unwrap_err();

    match err {
        CoreError::ExclusiveSectionTimeout { app_id, waited_ms } => {
            assert_eq!(app_id, app.id());
            assert_eq!(waited_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_subscriber_is_dropped_without_affecting_others() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let failing = Arc::new(FailingSubscriber::new());
    let viewer = RecordingSubscriber::new();
    engine.subscribe(app.id(), failing.clone()).await.unwrap();
    engine.subscribe(app.id(), viewer.handle()).await.unwrap();

    app.write_file("a.txt", "2");
    engine.commit(app.id(), "second").await.unwrap();
    app.write_file("a.txt", "3");
    engine.commit(app.id(), "third").await.unwrap();
    engine.flush(app.id()).await.unwrap();

    let handle = engine.registry().get(app.id()).await.unwrap();
    assert_eq!(handle.subscriber_count().await, 1);
    assert_eq!(failing.attempts(), 1);
    assert_eq!(viewer.events().len(), 2);
    assert_eq!(
        viewer.last_for("a.txt").unwrap().content,
        Some(FileContent::Utf8("3".to_string()))
    );
}

#[tokio::test]
async fn run_task_applies_items_and_records_snapshot() {
    let app = TestApp::new().with_file("index.html", "old").build();
    let engine = app.engine().await;
    let viewer = RecordingSubscriber::new();
    engine.subscribe(app.id(), viewer.handle()).await.unwrap();

    let generator = ScriptedGenerator::new()
        .then_transient("overloaded")
        .then_items(vec![
            ProjectItem::file("index.html", "<h1>Landing</h1>"),
            ProjectItem::file("src/app.js", "start()"),
        ]);

    let outcome = engine
        .run_task(app.id(), &generator, "Build a landing page", quick_retry())
        .await
        .unwrap();
    engine.flush(app.id()).await.unwrap();

    assert_eq!(generator.tasks().len(), 2);
    assert!(outcome.task_id.starts_with("tsk_"));
    assert_eq!(outcome.applied.files_written, vec!["index.html", "src/app.js"]);
    assert_changes(&outcome.changes, &["src/app.js"], &["index.html"], &[]);
    assert!(outcome.notifications.is_complete());

    let history = engine.history(app.id(), None).await.unwrap();
    assert_eq!(history[0].id, outcome.snapshot);
    assert_eq!(history[0].message, "Build a landing page");
    assert_eq!(viewer.events().len(), 2);
}

#[tokio::test]
async fn failed_generation_records_nothing() {
    let app = TestApp::new().with_file("a.txt", "1").build();
    let engine = app.engine().await;
    let generator = ScriptedGenerator::new().then_fatal("bad request");

    let err = engine
        .run_task(app.id(), &generator, "anything", quick_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Generator(_)));
    assert_eq!(engine.history(app.id(), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn app_lifecycle_create_rename_reopen_delete() {
    let apps_dir = TempDir::new().unwrap();
    let config = EngineConfig {
        apps_dir: Some(apps_dir.path().to_path_buf()),
        ..Default::default()
    };

    let engine = Engine::new(config.clone());
    let app = engine.create_app("Todo list").await.unwrap();
    assert!(app.workdir.is_dir());
    assert_eq!(engine.history(&app.id, None).await.unwrap().len(), 1);

    engine.rename_app(&app.id, "Groceries").await.unwrap();

    let reopened = Engine::new(config.clone()).open_app(&app.id).await.unwrap();
    assert_eq!(reopened.name, "Groceries");
    assert_eq!(reopened.workdir, app.workdir);

    engine.delete_app(&app.id).await.unwrap();
    assert!(!app.workdir.exists());
    assert!(!app.metadata_path().exists());

    let err = Engine::new(config).open_app(&app.id).await.unwrap_err();
    assert!(matches!(err, CoreError::AppNotFound(_)));
}

#[tokio::test]
async fn operations_on_unregistered_apps_fail() {
    let engine = Engine::new(EngineConfig::default());

    let err = engine.commit("app_missing", "x").await.unwrap_err();
    assert!(matches!(err, CoreError::AppNotFound(_)));

    let err = engine.open_app("../escape").await.unwrap_err();
    assert!(matches!(err, CoreError::AppNotFound(_)));
}

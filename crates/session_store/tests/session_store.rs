use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use agent_runtime::{AiMessage, HumanMessage, RawMessage, ToolInvocation, ToolResultMessage};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use session_store::{SessionDirectory, SessionStore, SessionStoreError, StatePatch};
use tempfile::TempDir;

fn write_thread_file(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("thread-1.jsonl");
    let mut file = File::create(&path).expect("thread file should be created");

    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, path)
}

fn header_line() -> String {
    json!({
        "type": "session",
        "version": 1,
        "thread_id": "thread-1",
        "parent_thread_id": null,
        "workspace_id": "ws-1",
        "title": "Fix build",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string()
}

fn message_line(ts: &str, message: serde_json::Value) -> String {
    json!({
        "type": "message",
        "ts": ts,
        "message": message,
    })
    .to_string()
}

fn human(id: &str, text: &str) -> serde_json::Value {
    json!({"type": "human", "id": id, "content": text})
}

fn directory() -> (TempDir, SessionDirectory) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let sessions = SessionDirectory::new(dir.path());
    (dir, sessions)
}

#[test]
fn open_rejects_missing_header() {
    let (_dir, path) = write_thread_file(&[]);

    let error = SessionStore::open(&path).err().expect("empty file must fail");
    assert_matches!(error, SessionStoreError::MissingHeader { .. });
}

#[test]
fn open_rejects_non_header_first_line() {
    let (_dir, path) = write_thread_file(&[message_line(
        "2026-02-14T00:00:01Z",
        human("h1", "hello"),
    )]);

    let error = SessionStore::open(&path)
        .err()
        .expect("message as first line must fail");
    assert_matches!(error, SessionStoreError::InvalidHeaderRecord { line: 1, .. });
}

#[test]
fn open_rejects_unsupported_header_version() {
    let (_dir, path) = write_thread_file(&[json!({
        "type": "session",
        "version": 2,
        "thread_id": "thread-1",
        "workspace_id": "ws-1",
        "title": "",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("unsupported version must fail");
    assert_matches!(
        error,
        SessionStoreError::UnsupportedVersion {
            line: 1,
            found: 2,
            ..
        }
    );
}

#[test]
fn open_rejects_unknown_header_fields() {
    let (_dir, path) = write_thread_file(&[json!({
        "type": "session",
        "version": 1,
        "thread_id": "thread-1",
        "workspace_id": "ws-1",
        "title": "",
        "created_at": "2026-02-14T00:00:00Z",
        "cwd": "/tmp",
    })
    .to_string()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("unknown header field must fail");
    assert_matches!(error, SessionStoreError::JsonLineParse { line: 1, .. });
}

#[test]
fn open_rejects_malformed_json_line_with_line_context() {
    let (_dir, path) = write_thread_file(&[header_line(), "{not json".to_string()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("malformed line must fail");
    assert_matches!(error, SessionStoreError::JsonLineParse { line: 2, .. });
    assert!(error.to_string().contains(":2:"));
}

#[test]
fn open_rejects_second_header() {
    let (_dir, path) = write_thread_file(&[header_line(), header_line()]);

    let error = SessionStore::open(&path)
        .err()
        .expect("second header must fail");
    assert_matches!(error, SessionStoreError::InvalidRecord { line: 2, .. });
}

#[test]
fn open_rejects_invalid_timestamps() {
    let (_dir, path) = write_thread_file(&[
        header_line(),
        message_line("yesterday", human("h1", "hello")),
    ]);

    let error = SessionStore::open(&path)
        .err()
        .expect("invalid ts must fail");
    assert_matches!(
        error,
        SessionStoreError::InvalidTimestamp { line: 2, field: "ts", .. }
    );
}

#[test]
fn open_rejects_duplicate_message_ids() {
    let (_dir, path) = write_thread_file(&[
        header_line(),
        message_line("2026-02-14T00:00:01Z", human("h1", "hello")),
        message_line("2026-02-14T00:00:02Z", human("h1", "again")),
    ]);

    let error = SessionStore::open(&path)
        .err()
        .expect("duplicate id must fail");
    assert_matches!(
        error,
        SessionStoreError::DuplicateMessageId { line: 3, ref id, .. } if id == "h1"
    );
}

#[test]
fn open_replays_messages_and_state_patches_in_order() {
    let (_dir, path) = write_thread_file(&[
        header_line(),
        message_line("2026-02-14T00:00:01Z", human("h1", "hello")),
        json!({
            "type": "state",
            "ts": "2026-02-14T00:00:02Z",
            "context_files": ["a.rs"],
            "command": "/fix"
        })
        .to_string(),
        json!({
            "type": "state",
            "ts": "2026-02-14T00:00:03Z",
            "title": "Renamed",
            "command": ""
        })
        .to_string(),
        message_line("2026-02-14T00:00:04Z", json!({"type": "checkpoint"})),
    ]);

    let store = SessionStore::open(&path).expect("valid thread file opens");

    assert_eq!(store.history().len(), 2);
    assert_eq!(store.history()[1], RawMessage::Unknown);
    assert_eq!(store.title(), "Renamed");
    assert_eq!(store.context_files(), ["a.rs".to_string()]);
    assert_eq!(store.command(), None);
    assert!(store.can_resume());
}

#[test]
fn create_writes_header_and_append_persists_each_message() {
    let (dir, sessions) = directory();
    let mut store = sessions
        .create("thread-1", "ws-1", "Fix build")
        .expect("thread should be created");

    assert_eq!(
        store.path(),
        dir.path().join("threads").join("thread-1.jsonl")
    );
    assert!(!store.can_resume());

    store
        .append_message(HumanMessage::new("h1", "hello").into())
        .expect("append human");
    store
        .append_message(
            AiMessage::new("a1", "")
                .with_tool_call(ToolInvocation::new("tc1", "search", Map::new()))
                .into(),
        )
        .expect("append ai");
    store
        .append_message(
            ToolResultMessage::success("t1", "tc1", "search", json!({"hits": 3})).into(),
        )
        .expect("append tool result");

    let written = std::fs::read_to_string(store.path()).expect("thread file readable");
    assert_eq!(written.lines().count(), 4);

    let reopened = sessions.open("thread-1").expect("thread reopens");
    assert_eq!(reopened.history(), store.history());
    assert_eq!(reopened.header(), store.header());
}

#[test]
fn append_rejects_duplicate_ids_without_writing() {
    let (_dir, sessions) = directory();
    let mut store = sessions
        .create("thread-1", "ws-1", "")
        .expect("thread should be created");
    store
        .append_message(HumanMessage::new("h1", "hello").into())
        .expect("first append");

    let error = store
        .append_message(AiMessage::new("h1", "clash").into())
        .err()
        .expect("duplicate id must fail");
    assert_matches!(error, SessionStoreError::DuplicateMessageId { line: 3, .. });

    let written = std::fs::read_to_string(store.path()).expect("thread file readable");
    assert_eq!(written.lines().count(), 2);
    assert_eq!(store.history().len(), 1);
}

#[test]
fn create_refuses_to_overwrite_an_existing_thread() {
    let (_dir, sessions) = directory();
    sessions
        .create("thread-1", "ws-1", "")
        .expect("thread should be created");

    let error = sessions
        .create("thread-1", "ws-1", "")
        .err()
        .expect("second create must fail");
    assert_matches!(
        error,
        SessionStoreError::ThreadExists { ref thread_id } if thread_id == "thread-1"
    );
}

#[test]
fn metadata_reflects_header_and_latest_state() {
    let (_dir, sessions) = directory();
    let mut store = sessions
        .create("thread-1", "ws-1", "Fix build")
        .expect("thread should be created");
    store
        .update_state(StatePatch {
            context_files: Some(vec!["src/lib.rs".to_string()]),
            command: Some("/test".to_string()),
            ..StatePatch::default()
        })
        .expect("state update");

    let metadata = store.metadata();
    assert_eq!(metadata.title, "Fix build");
    assert_eq!(metadata.created_at, store.header().created_at);
    assert_eq!(metadata.parent_thread_id, None);
    assert_eq!(metadata.context_files, vec!["src/lib.rs".to_string()]);
    assert_eq!(metadata.command.as_deref(), Some("/test"));

    let reopened = sessions.open("thread-1").expect("thread reopens");
    assert_eq!(reopened.metadata(), metadata);
}

#[test]
fn branch_clones_history_and_state_with_parent_link() {
    let (_dir, sessions) = directory();
    let mut source = sessions
        .create("thread-1", "ws-1", "Fix build")
        .expect("thread should be created");
    source
        .append_message(HumanMessage::new("h1", "hello").into())
        .expect("append");
    source
        .append_message(AiMessage::new("a1", "hi").into())
        .expect("append");
    source
        .update_state(StatePatch {
            context_files: Some(vec!["a.rs".to_string()]),
            ..StatePatch::default()
        })
        .expect("state update");

    let branch = sessions
        .branch("thread-2", "thread-1")
        .expect("branch should succeed");

    assert_eq!(branch.header().parent_thread_id.as_deref(), Some("thread-1"));
    assert_eq!(branch.header().workspace_id, "ws-1");
    assert_eq!(branch.history(), source.history());
    assert_eq!(branch.title(), "Fix build");
    assert_eq!(branch.context_files(), ["a.rs".to_string()]);

    source
        .append_message(HumanMessage::new("h2", "only in source").into())
        .expect("append after branch");
    let reopened = sessions.open("thread-2").expect("branch reopens");
    assert_eq!(reopened.history().len(), 2);
}

#[test]
fn branch_of_empty_thread_has_empty_history() {
    let (_dir, sessions) = directory();
    sessions
        .create("thread-1", "ws-1", "")
        .expect("thread should be created");

    let branch = sessions
        .branch("thread-2", "thread-1")
        .expect("branch should succeed");
    let context = branch.session_context();

    assert!(branch.history().is_empty());
    assert_eq!(context.thread_id, "thread-2");
    assert_eq!(
        context.metadata.and_then(|metadata| metadata.parent_thread_id),
        Some("thread-1".to_string())
    );
    assert_eq!(context.can_resume, Some(false));
}

#[test]
fn branch_requires_existing_source_and_fresh_target() {
    let (_dir, sessions) = directory();
    assert_matches!(
        sessions.branch("thread-2", "missing"),
        Err(SessionStoreError::ThreadNotFound { .. })
    );

    sessions.create("thread-1", "ws-1", "").expect("create");
    sessions.create("thread-2", "ws-1", "").expect("create");
    assert_matches!(
        sessions.branch("thread-2", "thread-1"),
        Err(SessionStoreError::ThreadExists { .. })
    );
}

#[test]
fn list_exists_and_delete_thread() {
    let (_dir, sessions) = directory();
    assert_eq!(sessions.list().expect("list on empty dir"), Vec::<String>::new());

    sessions.create("b", "ws-1", "").expect("create");
    sessions.create("a", "ws-1", "").expect("create");
    assert_eq!(sessions.list().expect("list"), vec!["a".to_string(), "b".to_string()]);
    assert!(sessions.exists("a").expect("valid id"));

    sessions.delete_thread("a").expect("delete");
    assert!(!sessions.exists("a").expect("valid id"));
    assert_matches!(
        sessions.delete_thread("a"),
        Err(SessionStoreError::ThreadNotFound { .. })
    );
    assert_matches!(sessions.open("a"), Err(ref error) if error.is_not_found());
}

#[test]
fn delete_index_is_idempotent() {
    let (dir, sessions) = directory();
    let index = dir.path().join("index").join("thread-1");
    std::fs::create_dir_all(&index).expect("index dir");
    std::fs::write(index.join("chunks.bin"), b"\0\0").expect("index file");

    assert!(sessions.delete_index("thread-1").expect("first delete"));
    assert!(!index.exists());
    assert!(!sessions.delete_index("thread-1").expect("second delete"));
}

#[test]
fn invalid_thread_ids_never_touch_the_filesystem() {
    let (_dir, sessions) = directory();

    assert_matches!(
        sessions.create("../escape", "ws-1", ""),
        Err(SessionStoreError::InvalidThreadId { .. })
    );
    assert_matches!(
        sessions.delete_index("a/b"),
        Err(SessionStoreError::InvalidThreadId { .. })
    );
}

#[test]
fn create_new_generates_a_valid_thread_id() {
    let (_dir, sessions) = directory();
    let store = sessions.create_new("ws-1", "").expect("create new");

    assert!(sessions.exists(store.thread_id()).expect("generated id is valid"));
}

//! Integration tests for TableEditor
//!
//! Exercises the optimistic write path against MockStore: local apply,
//! remote write, rollback on rejection and resync on count mismatch.

mod common;

use std::sync::Arc;

use dbgrid_core::{GridConfig, Store, Value};
use dbgrid_services::{BrowserSession, EditError, WriteOutcome};
use dbgrid_table::{ChangeEvent, ChangeKind, EditOutcome};
use pretty_assertions::assert_eq;

use common::{MockStore, sorted, user, users_store};

fn session(store: &Arc<MockStore>) -> BrowserSession {
    BrowserSession::new(store.clone() as Arc<dyn Store>, GridConfig::default())
}

// ============ request_update Tests ============

#[tokio::test]
async fn update_applies_locally_and_remotely() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let outcome = editor
        .request_update(user(2, "b"), vec![(1, Value::from("B"))])
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Applied { rows: 1 });
    assert_eq!(editor.model().get_row(1).unwrap(), user(2, "B"));
    assert_eq!(store.remote_rows("users"), vec![user(1, "a"), user(2, "B")]);
    assert_eq!(session.undo_depth(), 1);
}

#[tokio::test]
async fn update_with_stale_criteria_is_rejected() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    editor
        .request_update(user(2, "b"), vec![(1, Value::from("B"))])
        .await
        .unwrap();

    // The criteria still describes the row as it was before the first edit
    let err = editor
        .request_update(user(2, "b"), vec![(1, Value::from("C"))])
        .await
        .unwrap_err();

    assert!(matches!(err, EditError::StaleCriteria));
    assert_eq!(editor.model().get_row(1).unwrap(), user(2, "B"));
    assert_eq!(store.calls("exec_update"), 1, "stale edit must not reach the store");
    assert_eq!(session.undo_depth(), 1);
}

#[tokio::test]
async fn update_type_mismatch_never_reaches_store() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let err = editor
        .request_update(user(1, "a"), vec![(0, Value::from("one"))])
        .await
        .unwrap_err();

    assert!(matches!(err, EditError::Core(_)));
    assert_eq!(store.calls("exec_update"), 0);
    assert_eq!(session.undo_depth(), 0);
}

#[tokio::test]
async fn update_rejected_by_store_rolls_back() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();
    let revision_before = editor.model().revision();

    let rejections = Arc::new(std::sync::Mutex::new(Vec::new()));
    let listener = {
        let rejections = rejections.clone();
        Arc::new(move |event: &ChangeEvent| {
            if let ChangeKind::WriteRejected { operation, .. } = &event.kind {
                rejections.lock().unwrap().push(operation.clone());
            }
        })
    };
    editor.model().subscribe(&listener);

    store.set_fail_writes(true);
    let err = editor
        .request_update(user(2, "b"), vec![(1, Value::from("B"))])
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert_eq!(editor.model().get_row(1).unwrap(), user(2, "b"));
    assert_eq!(session.undo_depth(), 0);
    assert_eq!(*rejections.lock().unwrap(), vec!["UPDATE".to_string()]);
    // Apply and rollback are two changes
    assert_eq!(editor.model().revision(), revision_before + 2);
}

#[tokio::test]
async fn update_matching_no_remote_row_rolls_back() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    store.set_remote_rows("users", vec![user(1, "a")]);
    let err = editor
        .request_update(user(2, "b"), vec![(1, Value::from("B"))])
        .await
        .unwrap_err();

    assert!(matches!(err, EditError::RemoteFailure(_)));
    assert_eq!(editor.model().get_row(1).unwrap(), user(2, "b"));
    assert_eq!(session.undo_depth(), 0);
}

#[tokio::test]
async fn update_affecting_duplicates_resyncs() {
    let store = Arc::new(MockStore::new("mock").with_table(
        "users",
        common::user_columns(),
        vec![user(1, "a"), user(1, "a")],
    ));
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let outcome = editor
        .request_update(user(1, "a"), vec![(1, Value::from("z"))])
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Resynchronized { affected: 2 });
    assert_eq!(
        editor.model().snapshot().rows(),
        &[user(1, "z"), user(1, "z")]
    );
    assert_eq!(store.calls("fetch_all"), 2);
}

#[tokio::test]
async fn update_rollback_reverts_the_edited_duplicate() {
    let store = Arc::new(MockStore::new("mock").with_table(
        "users",
        common::user_columns(),
        vec![user(1, "B"), user(1, "b")],
    ));
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let kinds = Arc::new(std::sync::Mutex::new(Vec::new()));
    let listener = {
        let kinds = kinds.clone();
        Arc::new(move |event: &ChangeEvent| kinds.lock().unwrap().push(event.kind.clone()))
    };
    editor.model().subscribe(&listener);

    // After the local edit both rows read (1, "B"); only the second was edited
    store.set_fail_writes(true);
    editor
        .request_update(user(1, "b"), vec![(1, Value::from("B"))])
        .await
        .unwrap_err();

    assert_eq!(
        editor.model().snapshot().rows(),
        &[user(1, "B"), user(1, "b")]
    );
    let kinds = kinds.lock().unwrap();
    assert_eq!(kinds[0], ChangeKind::RowUpdated { index: 1 });
    assert_eq!(kinds[1], ChangeKind::RowUpdated { index: 1 });
}

// ============ request_insert Tests ============

#[tokio::test]
async fn insert_then_undo_removes_exactly_that_row() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();
    let before = editor.model().snapshot().rows().to_vec();

    let index = editor.request_insert(user(3, "c")).await.unwrap();
    assert_eq!(index, 2);
    assert_eq!(editor.model().row_count(), 3);

    session.undo_last().await.unwrap();
    assert_eq!(editor.model().snapshot().rows(), before.as_slice());
    assert_eq!(store.remote_rows("users"), before);
}

#[tokio::test]
async fn insert_rejected_by_store_rolls_back() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    store.set_fail_writes(true);
    let err = editor.request_insert(user(3, "c")).await.unwrap_err();

    assert!(matches!(err, EditError::RemoteFailure(_)));
    assert_eq!(editor.model().row_count(), 2);
    assert_eq!(session.undo_depth(), 0);
}

#[tokio::test]
async fn insert_with_wrong_arity_is_schema_mismatch() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let err = editor
        .request_insert(dbgrid_core::Row::new(vec![Value::Int32(3)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EditError::Core(dbgrid_core::CoreError::SchemaMismatch(_))
    ));
    assert_eq!(store.calls("exec_insert"), 0);
}

// ============ request_delete Tests ============

#[tokio::test]
async fn delete_then_undo_restores_row() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let outcome = editor.request_delete(user(1, "a")).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Applied { rows: 1 });
    assert_eq!(editor.model().snapshot().rows(), &[user(2, "b")]);

    session.undo_last().await.unwrap();
    assert_eq!(editor.model().row_count(), 2);
    assert_eq!(
        sorted(editor.model().snapshot().rows().to_vec()),
        vec![user(1, "a"), user(2, "b")]
    );
    assert_eq!(
        sorted(store.remote_rows("users")),
        vec![user(1, "a"), user(2, "b")]
    );
}

#[tokio::test]
async fn delete_removes_duplicates_in_one_request() {
    let store = Arc::new(MockStore::new("mock").with_table(
        "users",
        common::user_columns(),
        vec![user(1, "a"), user(2, "b"), user(1, "a")],
    ));
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let outcome = editor.request_delete(user(1, "a")).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Applied { rows: 2 });
    assert_eq!(store.calls("exec_delete"), 1);
    assert_eq!(session.undo_depth(), 1);

    session.undo_last().await.unwrap();
    assert_eq!(
        editor.model().snapshot().rows(),
        &[user(1, "a"), user(2, "b"), user(1, "a")]
    );
}

#[tokio::test]
async fn delete_with_no_local_match_is_stale() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let err = editor.request_delete(user(9, "z")).await.unwrap_err();
    assert!(matches!(err, EditError::StaleCriteria));
    assert_eq!(store.calls("exec_delete"), 0);
}

#[tokio::test]
async fn delete_rejected_by_store_restores_position() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    store.set_fail_writes(true);
    editor.request_delete(user(1, "a")).await.unwrap_err();

    assert_eq!(
        editor.model().snapshot().rows(),
        &[user(1, "a"), user(2, "b")]
    );
    assert_eq!(session.undo_depth(), 0);
}

// ============ View edits ============

#[tokio::test]
async fn view_edit_flows_to_sibling_views() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();

    let filtered = session.attach_view("users").unwrap();
    let unfiltered = session.attach_view("users").unwrap();
    filtered.add_filter(1, "b").unwrap();

    let outcome = filtered
        .commit_text_edit(&*editor, 0, 1, "B")
        .await
        .unwrap();

    assert_eq!(outcome, EditOutcome::Submitted);
    assert_eq!(filtered.visible_row_count(), 0);
    assert_eq!(unfiltered.visible_row_count(), 2);
    assert_eq!(unfiltered.row_at(1).unwrap(), user(2, "B"));
    assert_eq!(store.remote_rows("users")[1], user(2, "B"));
}

#[tokio::test]
async fn view_edit_rejected_by_store_keeps_view_consistent() {
    let store = users_store();
    let session = session(&store);
    let editor = session.open_table("users").await.unwrap();
    let view = session.attach_view("users").unwrap();
    view.select(1, 1).unwrap();

    store.set_fail_writes(true);
    let err = view
        .commit_edit(&*editor, 1, 1, Value::from("B"))
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert_eq!(view.row_at(1).unwrap(), user(2, "b"));
    assert_eq!(view.selection().map(|s| s.canonical_row), Some(1));
}

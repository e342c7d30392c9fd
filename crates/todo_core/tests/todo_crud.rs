use rusqlite::Connection;
use std::time::Duration;
use todo_core::db::migrations::latest_version;
use todo_core::db::open_db_in_memory;
use todo_core::{ItemValidationError, RepoError, SqliteTodoRepository, TodoRepository};

#[test]
fn create_and_get_list_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();

    let created = repo.create_list("Groceries", "weekly run", "u1").unwrap();
    let loaded = repo.get_list(created.id).unwrap().unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.title, "Groceries");
    assert_eq!(loaded.description, "weekly run");
    assert_eq!(loaded.owner_id, "u1");
    assert_eq!(loaded.created_at, loaded.modified_at);
}

#[test]
fn list_ids_are_assigned_by_storage_and_never_reused() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();

    let first = repo.create_list("A", "", "u1").unwrap();
    assert!(repo.delete_list(first.id).unwrap());
    let second = repo.create_list("B", "", "u1").unwrap();

    assert!(second.id > first.id);
}

#[test]
fn empty_titles_are_stored_as_given() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();

    let list = repo.create_list("", "", "u1").unwrap();
    let item = repo.create_item(list.id, "").unwrap();

    assert_eq!(repo.get_list(list.id).unwrap().unwrap().title, "");
    assert_eq!(repo.get_item(item.id).unwrap().unwrap().title, "");
}

#[test]
fn create_item_defaults_to_open_one_off_task() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Chores", "", "u1").unwrap();

    let item = repo.create_item(list.id, "Vacuum").unwrap();

    assert_eq!(item.list_id, list.id);
    assert!(!item.is_completed);
    assert!(!item.is_repetitive);
    assert_eq!(item.repeat_interval, None);
    assert_eq!(repo.items_for_list(list.id).unwrap(), vec![item]);
}

#[test]
fn create_item_under_missing_list_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();

    let err = repo.create_item(4242, "orphan").unwrap_err();

    assert!(matches!(err, RepoError::ListNotFound(4242)));
    assert_eq!(count_rows(&conn, "todo_items"), 0);
}

#[test]
fn update_list_fields_replaces_title_and_description() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Old", "old desc", "u1").unwrap();
    backdate(&conn, "todo_lists", list.id);

    assert!(repo.update_list_fields(list.id, "New", "new desc").unwrap());

    let loaded = repo.get_list(list.id).unwrap().unwrap();
    assert_eq!(loaded.title, "New");
    assert_eq!(loaded.description, "new desc");
    assert_eq!(loaded.owner_id, "u1");
    assert!(loaded.modified_at > 1);
    assert_eq!(loaded.created_at, list.created_at);
}

#[test]
fn updates_and_deletes_on_missing_rows_report_false() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();

    assert!(!repo.update_list_fields(99, "x", "y").unwrap());
    assert!(!repo.delete_list(99).unwrap());
    assert!(!repo.update_item_title(99, "x").unwrap());
    assert!(!repo.set_item_completion(99, true).unwrap());
    assert!(!repo
        .set_item_repetition(99, Some(Duration::from_secs(60)))
        .unwrap());
    assert!(!repo.delete_item(99).unwrap());
    assert!(repo.get_list(99).unwrap().is_none());
    assert!(repo.get_item(99).unwrap().is_none());
}

#[test]
fn delete_list_cascades_to_items_only_of_that_list() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let doomed = repo.create_list("Doomed", "", "u1").unwrap();
    let kept = repo.create_list("Kept", "", "u1").unwrap();
    let a = repo.create_item(doomed.id, "a").unwrap();
    let b = repo.create_item(doomed.id, "b").unwrap();
    let survivor = repo.create_item(kept.id, "c").unwrap();

    assert!(repo.delete_list(doomed.id).unwrap());

    assert!(repo.get_list(doomed.id).unwrap().is_none());
    assert!(repo.get_item(a.id).unwrap().is_none());
    assert!(repo.get_item(b.id).unwrap().is_none());
    assert_eq!(repo.get_item(survivor.id).unwrap(), Some(survivor));
    assert_eq!(count_rows(&conn, "todo_items"), 1);
}

#[test]
fn storage_cascade_removes_items_on_raw_list_delete() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    repo.create_item(list.id, "a").unwrap();

    conn.execute("DELETE FROM todo_lists WHERE id = ?1;", [list.id])
        .unwrap();

    assert_eq!(count_rows(&conn, "todo_items"), 0);
}

#[test]
fn set_item_completion_flips_flag_and_refreshes_modified_at() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "task").unwrap();
    backdate(&conn, "todo_items", item.id);

    assert!(repo.set_item_completion(item.id, true).unwrap());
    let done = repo.get_item(item.id).unwrap().unwrap();
    assert!(done.is_completed);
    assert!(done.modified_at > 1);

    assert!(repo.set_item_completion(item.id, false).unwrap());
    assert!(!repo.get_item(item.id).unwrap().unwrap().is_completed);
}

#[test]
fn set_item_completion_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "task").unwrap();

    assert!(repo.set_item_completion(item.id, true).unwrap());
    assert!(repo.set_item_completion(item.id, true).unwrap());

    assert!(repo.get_item(item.id).unwrap().unwrap().is_completed);
}

#[test]
fn update_item_title_keeps_other_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "before").unwrap();
    repo.set_item_completion(item.id, true).unwrap();

    assert!(repo.update_item_title(item.id, "after").unwrap());

    let loaded = repo.get_item(item.id).unwrap().unwrap();
    assert_eq!(loaded.title, "after");
    assert!(loaded.is_completed);
    assert_eq!(loaded.list_id, list.id);
}

#[test]
fn set_item_repetition_roundtrips_and_clears() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "water plants").unwrap();
    let weekly = Duration::from_secs(7 * 24 * 60 * 60);

    assert!(repo.set_item_repetition(item.id, Some(weekly)).unwrap());
    let repeating = repo.get_item(item.id).unwrap().unwrap();
    assert!(repeating.is_repetitive);
    assert_eq!(repeating.repeat_interval, Some(weekly));
    assert_eq!(repeating.effective_interval(), Some(weekly));

    assert!(repo.set_item_repetition(item.id, None).unwrap());
    let one_off = repo.get_item(item.id).unwrap().unwrap();
    assert!(!one_off.is_repetitive);
    assert_eq!(one_off.repeat_interval, None);
}

#[test]
fn set_item_repetition_rejects_sub_second_interval() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "task").unwrap();

    let err = repo
        .set_item_repetition(item.id, Some(Duration::from_millis(500)))
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::Validation(ItemValidationError::ZeroRepeatInterval)
    ));
    assert!(!repo.get_item(item.id).unwrap().unwrap().is_repetitive);
}

#[test]
fn lists_for_owner_returns_only_owned_lists_with_items_in_id_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let first = repo.create_list("First", "", "u1").unwrap();
    let foreign = repo.create_list("Foreign", "", "u2").unwrap();
    let second = repo.create_list("Second", "", "u1").unwrap();
    let a = repo.create_item(second.id, "a").unwrap();
    let b = repo.create_item(first.id, "b").unwrap();
    let c = repo.create_item(second.id, "c").unwrap();
    repo.create_item(foreign.id, "hidden").unwrap();

    let lists = repo.lists_for_owner("u1").unwrap();

    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].list.id, first.id);
    assert_eq!(lists[0].items, vec![b]);
    assert_eq!(lists[1].list.id, second.id);
    assert_eq!(lists[1].items, vec![a, c]);
    assert!(repo.lists_for_owner("nobody").unwrap().is_empty());
}

#[test]
fn owner_match_is_exact_not_substring() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    repo.create_list("Long id", "", "user-10").unwrap();

    assert!(repo.lists_for_owner("user-1").unwrap().is_empty());
    assert_eq!(repo.lists_for_owner("user-10").unwrap().len(), 1);
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteTodoRepository::try_new(&conn)
        .err()
        .expect("bare connection must be rejected");

    match err {
        RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        } => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupted_completion_flag_surfaces_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let list = repo.create_list("L", "", "u1").unwrap();
    let item = repo.create_item(list.id, "task").unwrap();
    conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
        .unwrap();
    conn.execute(
        "UPDATE todo_items SET is_completed = 7 WHERE id = ?1;",
        [item.id],
    )
    .unwrap();

    let err = repo.get_item(item.id).unwrap_err();

    assert!(matches!(err, RepoError::InvalidData(_)));
}

fn backdate(conn: &Connection, table: &str, id: i64) {
    conn.execute(
        &format!("UPDATE {table} SET modified_at = 1 WHERE id = ?1;"),
        [id],
    )
    .unwrap();
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

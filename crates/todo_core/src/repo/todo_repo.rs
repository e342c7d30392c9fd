//! List/item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the transactional CRUD gateway over `todo_lists` and `todo_items`.
//! - Keep SQL details and row mapping inside the persistence boundary.
//!
//! # Invariants
//! - Every mutation commits before returning; nothing is deferred.
//! - Updates and deletes report whether a row was affected instead of failing
//!   on missing ids, so callers choose between no-op and not-found semantics.
//! - Deleting a list removes its items in the same transaction.
//! - Every mutation refreshes `modified_at`, including completion toggles.
//! - Items can only be created under an existing list (foreign key).

use crate::db::migrations::latest_version;
use crate::db::{is_constraint_violation, now_epoch_ms, schema_version, table_exists, DbError};
use crate::model::todo::{
    validate_repetition, ItemId, ItemValidationError, ListId, ListWithItems, ToDoItem, ToDoList,
};
use rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const LIST_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    owner_id,
    created_at,
    modified_at
FROM todo_lists";

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    list_id,
    title,
    is_completed,
    is_repetitive,
    repeat_interval_secs,
    created_at,
    modified_at
FROM todo_items";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from list/item persistence operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Item creation referenced a list that does not exist.
    ListNotFound(ListId),
    /// Repetition metadata failed validation.
    Validation(ItemValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ListNotFound(id) => write!(f, "to-do list not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "to-do repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "to-do repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted to-do data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::ListNotFound(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ItemValidationError> for RepoError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Persistence gateway for lists and items.
///
/// Methods take raw ids and never check ownership; that is the service
/// layer's job.
pub trait TodoRepository {
    /// Persists a new list with both timestamps set to now.
    fn create_list(&self, title: &str, description: &str, owner_id: &str)
        -> RepoResult<ToDoList>;
    /// Loads one list by id.
    fn get_list(&self, id: ListId) -> RepoResult<Option<ToDoList>>;
    /// Replaces title and description. Returns `false` when the list is missing.
    fn update_list_fields(&self, id: ListId, title: &str, description: &str)
        -> RepoResult<bool>;
    /// Deletes a list and all of its items atomically.
    fn delete_list(&self, id: ListId) -> RepoResult<bool>;
    /// Loads every list owned by `owner_id` with its items attached.
    fn lists_for_owner(&self, owner_id: &str) -> RepoResult<Vec<ListWithItems>>;
    /// Persists a new, not completed, one-off item under `list_id`.
    fn create_item(&self, list_id: ListId, title: &str) -> RepoResult<ToDoItem>;
    /// Loads one item by id.
    fn get_item(&self, id: ItemId) -> RepoResult<Option<ToDoItem>>;
    /// Lists items of one list in insertion order.
    fn items_for_list(&self, list_id: ListId) -> RepoResult<Vec<ToDoItem>>;
    /// Replaces an item title.
    fn update_item_title(&self, id: ItemId, title: &str) -> RepoResult<bool>;
    /// Sets the completion flag.
    fn set_item_completion(&self, id: ItemId, is_done: bool) -> RepoResult<bool>;
    /// Makes an item repeat every `interval`, or one-off when `None`.
    fn set_item_repetition(&self, id: ItemId, interval: Option<Duration>) -> RepoResult<bool>;
    /// Deletes one item.
    fn delete_item(&self, id: ItemId) -> RepoResult<bool>;
}

/// SQLite-backed list/item repository.
pub struct SqliteTodoRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTodoRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_todo_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TodoRepository for SqliteTodoRepository<'_> {
    fn create_list(
        &self,
        title: &str,
        description: &str,
        owner_id: &str,
    ) -> RepoResult<ToDoList> {
        let now = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO todo_lists (
                title,
                description,
                owner_id,
                created_at,
                modified_at
            ) VALUES (?1, ?2, ?3, ?4, ?4);",
            params![title, description, owner_id, now],
        )?;
        let id = self.conn.last_insert_rowid();
        load_list(self.conn, id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created list {id} not found in read-back"))
        })
    }

    fn get_list(&self, id: ListId) -> RepoResult<Option<ToDoList>> {
        load_list(self.conn, id)
    }

    fn update_list_fields(
        &self,
        id: ListId,
        title: &str,
        description: &str,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE todo_lists
             SET
                title = ?2,
                description = ?3,
                modified_at = ?4
             WHERE id = ?1;",
            params![id, title, description, now_epoch_ms()],
        )?;
        Ok(changed > 0)
    }

    fn delete_list(&self, id: ListId) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        // Explicit child delete keeps the contract even if cascade is off.
        tx.execute("DELETE FROM todo_items WHERE list_id = ?1;", [id])?;
        let changed = tx.execute("DELETE FROM todo_lists WHERE id = ?1;", [id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn lists_for_owner(&self, owner_id: &str) -> RepoResult<Vec<ListWithItems>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;

        let mut items_by_list: BTreeMap<ListId, Vec<ToDoItem>> = BTreeMap::new();
        {
            let mut stmt = tx.prepare(&format!(
                "{ITEM_SELECT_SQL}
                 WHERE list_id IN (SELECT id FROM todo_lists WHERE owner_id = ?1)
                 ORDER BY id ASC;"
            ))?;
            let mut rows = stmt.query([owner_id])?;
            while let Some(row) = rows.next()? {
                let item = parse_item_row(row)?;
                items_by_list.entry(item.list_id).or_default().push(item);
            }
        }

        let mut lists = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "{LIST_SELECT_SQL}
                 WHERE owner_id = ?1
                 ORDER BY id ASC;"
            ))?;
            let mut rows = stmt.query([owner_id])?;
            while let Some(row) = rows.next()? {
                let list = parse_list_row(row)?;
                let items = items_by_list.remove(&list.id).unwrap_or_default();
                lists.push(ListWithItems { list, items });
            }
        }

        tx.commit()?;
        Ok(lists)
    }

    fn create_item(&self, list_id: ListId, title: &str) -> RepoResult<ToDoItem> {
        let now = now_epoch_ms();
        let inserted = self.conn.execute(
            "INSERT INTO todo_items (
                list_id,
                title,
                is_completed,
                is_repetitive,
                repeat_interval_secs,
                created_at,
                modified_at
            ) VALUES (?1, ?2, 0, 0, NULL, ?3, ?3);",
            params![list_id, title, now],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err, SQLITE_CONSTRAINT_FOREIGNKEY) => {
                return Err(RepoError::ListNotFound(list_id));
            }
            Err(err) => return Err(err.into()),
        }

        let id = self.conn.last_insert_rowid();
        load_item(self.conn, id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created item {id} not found in read-back"))
        })
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<ToDoItem>> {
        load_item(self.conn, id)
    }

    fn items_for_list(&self, list_id: ListId) -> RepoResult<Vec<ToDoItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE list_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([list_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn update_item_title(&self, id: ItemId, title: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE todo_items
             SET
                title = ?2,
                modified_at = ?3
             WHERE id = ?1;",
            params![id, title, now_epoch_ms()],
        )?;
        Ok(changed > 0)
    }

    fn set_item_completion(&self, id: ItemId, is_done: bool) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE todo_items
             SET
                is_completed = ?2,
                modified_at = ?3
             WHERE id = ?1;",
            params![id, bool_to_int(is_done), now_epoch_ms()],
        )?;
        Ok(changed > 0)
    }

    fn set_item_repetition(&self, id: ItemId, interval: Option<Duration>) -> RepoResult<bool> {
        let is_repetitive = interval.is_some();
        validate_repetition(is_repetitive, interval)?;

        let changed = self.conn.execute(
            "UPDATE todo_items
             SET
                is_repetitive = ?2,
                repeat_interval_secs = ?3,
                modified_at = ?4
             WHERE id = ?1;",
            params![
                id,
                bool_to_int(is_repetitive),
                interval_to_db(interval)?,
                now_epoch_ms(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_item(&self, id: ItemId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM todo_items WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

fn load_list(conn: &Connection, id: ListId) -> RepoResult<Option<ToDoList>> {
    let mut stmt = conn.prepare(&format!("{LIST_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id], |row| Ok(parse_list_row(row)))
        .optional()?;
    row.transpose()
}

fn load_item(conn: &Connection, id: ItemId) -> RepoResult<Option<ToDoItem>> {
    let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id], |row| Ok(parse_item_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_list_row(row: &Row<'_>) -> RepoResult<ToDoList> {
    Ok(ToDoList {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        owner_id: row.get("owner_id")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    })
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<ToDoItem> {
    let repeat_interval = match row.get::<_, Option<i64>>("repeat_interval_secs")? {
        Some(secs) => Some(Duration::from_secs(u64::try_from(secs).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid repeat interval `{secs}` in todo_items.repeat_interval_secs"
            ))
        })?)),
        None => None,
    };

    let item = ToDoItem {
        id: row.get("id")?,
        list_id: row.get("list_id")?,
        title: row.get("title")?,
        is_completed: int_to_bool(row.get("is_completed")?, "is_completed")?,
        is_repetitive: int_to_bool(row.get("is_repetitive")?, "is_repetitive")?,
        repeat_interval,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    };
    item.validate()
        .map_err(|err| RepoError::InvalidData(format!("item {}: {err}", item.id)))?;
    Ok(item)
}

fn interval_to_db(interval: Option<Duration>) -> RepoResult<Option<i64>> {
    interval
        .map(|value| {
            i64::try_from(value.as_secs()).map_err(|_| {
                RepoError::InvalidData(format!(
                    "repeat interval of {}s does not fit storage",
                    value.as_secs()
                ))
            })
        })
        .transpose()
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in todo_items.{column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_todo_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["todo_lists", "todo_items"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

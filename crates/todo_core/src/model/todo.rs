//! List and item records.
//!
//! # Responsibility
//! - Define `ToDoList`, `ToDoItem` and the `ListWithItems` read model.
//! - Validate repetition metadata before it reaches storage.
//!
//! # Invariants
//! - `list_id` is a plain foreign-key value; resolving the parent list is
//!   always an explicit lookup.
//! - `repeat_interval` is meaningful only while `is_repetitive` is set, and
//!   must then be a non-zero duration.
//! - Timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Storage-assigned list identifier.
pub type ListId = i64;

/// Storage-assigned item identifier.
pub type ItemId = i64;

/// Identifier of an authenticated principal, as issued by the identity store.
pub type PrincipalId = String;

/// A named, user-owned container of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDoList {
    pub id: ListId,
    pub title: String,
    pub description: String,
    /// Only this principal may see or mutate the list.
    pub owner_id: PrincipalId,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A single task row belonging to exactly one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDoItem {
    pub id: ItemId,
    pub list_id: ListId,
    pub title: String,
    pub is_completed: bool,
    pub is_repetitive: bool,
    pub repeat_interval: Option<Duration>,
    pub created_at: i64,
    pub modified_at: i64,
}

impl ToDoItem {
    /// Validates repetition metadata.
    ///
    /// # Errors
    /// - `MissingRepeatInterval` when the item repeats without an interval.
    /// - `ZeroRepeatInterval` when the interval is zero or below one second.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        validate_repetition(self.is_repetitive, self.repeat_interval)
    }

    /// Interval that applies right now, `None` for one-off items.
    pub fn effective_interval(&self) -> Option<Duration> {
        if self.is_repetitive {
            self.repeat_interval
        } else {
            None
        }
    }
}

/// One list together with all of its items, as served to the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListWithItems {
    pub list: ToDoList,
    pub items: Vec<ToDoItem>,
}

/// Item repetition validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemValidationError {
    MissingRepeatInterval,
    ZeroRepeatInterval,
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRepeatInterval => {
                write!(f, "repeating items require a repeat interval")
            }
            Self::ZeroRepeatInterval => {
                write!(f, "repeat interval must be at least one second")
            }
        }
    }
}

impl Error for ItemValidationError {}

/// Shared repetition rule for both stored items and incoming updates.
pub fn validate_repetition(
    is_repetitive: bool,
    interval: Option<Duration>,
) -> Result<(), ItemValidationError> {
    if !is_repetitive {
        return Ok(());
    }
    match interval {
        None => Err(ItemValidationError::MissingRepeatInterval),
        Some(value) if value.as_secs() == 0 => Err(ItemValidationError::ZeroRepeatInterval),
        Some(_) => Ok(()),
    }
}

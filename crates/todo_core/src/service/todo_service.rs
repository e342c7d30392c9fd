//! Ownership-scoped to-do use-case service.
//!
//! # Responsibility
//! - Resolve the list view for the acting principal (ownership filter).
//! - Run create/edit/delete/toggle mutations after re-checking ownership.
//!
//! # Invariants
//! - A principal only ever sees lists whose `owner_id` equals its id, byte
//!   for byte; principal ids are opaque and never trimmed.
//! - Every mutation by id re-derives ownership from storage (list owner, or
//!   the owner of the item's parent list) before writing.
//! - Missing targets on edit/delete are silent no-ops; the completion toggle
//!   reports them as `CompletionStatus::NotFound`.

use crate::model::todo::{ItemId, ItemValidationError, ListId, ListWithItems, ToDoItem, ToDoList};
use crate::repo::todo_repo::{RepoError, TodoRepository};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Result of a list-view request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListsView {
    /// No authenticated principal; the transport should challenge.
    Challenge,
    /// Every list owned by the principal, items attached.
    Lists(Vec<ListWithItems>),
}

/// Response of create/edit/delete requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Done; send the caller back to the list view.
    RedirectToLists,
}

/// Structured response of the asynchronous completion toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    NotFound,
}

/// Target of a rejected mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedTarget {
    List(ListId),
    Item(ItemId),
}

impl Display for OwnedTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List(id) => write!(f, "list {id}"),
            Self::Item(id) => write!(f, "item {id}"),
        }
    }
}

/// Errors from to-do service operations.
#[derive(Debug)]
pub enum TodoServiceError {
    /// Principal id is blank.
    Unauthenticated,
    /// Target exists but belongs to another principal.
    Unauthorized {
        principal_id: String,
        target: OwnedTarget,
    },
    /// Referenced list does not exist.
    ListNotFound(ListId),
    /// Repetition metadata failed validation.
    Validation(ItemValidationError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for TodoServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "request has no authenticated principal"),
            Self::Unauthorized {
                principal_id,
                target,
            } => write!(f, "principal {principal_id} does not own {target}"),
            Self::ListNotFound(id) => write!(f, "to-do list not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TodoServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TodoServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ListNotFound(id) => Self::ListNotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

pub type TodoServiceResult<T> = Result<T, TodoServiceError>;

/// To-do service facade over a repository implementation.
pub struct TodoService<R: TodoRepository> {
    repo: R,
}

impl<R: TodoRepository> TodoService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Lists every list owned by `principal`, or asks for authentication.
    pub fn lists_for_principal(&self, principal: Option<&str>) -> TodoServiceResult<ListsView> {
        let Some(principal) = principal.filter(|id| !id.trim().is_empty()) else {
            debug!("event=lists_view module=service status=challenge");
            return Ok(ListsView::Challenge);
        };
        let lists = self.repo.lists_for_owner(principal)?;
        debug!(
            "event=lists_view module=service status=ok list_count={}",
            lists.len()
        );
        Ok(ListsView::Lists(lists))
    }

    /// Loads one owned list with its items.
    pub fn get_list(&self, principal: &str, id: ListId) -> TodoServiceResult<ListWithItems> {
        let list = self
            .authorize_list(principal, id)?
            .ok_or(TodoServiceError::ListNotFound(id))?;
        let items = self.repo.items_for_list(id)?;
        Ok(ListWithItems { list, items })
    }

    /// Creates a list owned by `principal`.
    pub fn create_list(
        &self,
        principal: &str,
        title: &str,
        description: &str,
    ) -> TodoServiceResult<ToDoList> {
        let principal = require_principal(principal)?;
        let list = self.repo.create_list(title, description, principal)?;
        info!(
            "event=list_create module=service status=ok list_id={}",
            list.id
        );
        Ok(list)
    }

    /// Creates an item under a list owned by `principal`.
    ///
    /// A missing list is an error here, not a no-op.
    pub fn create_item(
        &self,
        principal: &str,
        list_id: ListId,
        title: &str,
    ) -> TodoServiceResult<ToDoItem> {
        if self.authorize_list(principal, list_id)?.is_none() {
            return Err(TodoServiceError::ListNotFound(list_id));
        }
        let item = self.repo.create_item(list_id, title)?;
        info!(
            "event=item_create module=service status=ok list_id={} item_id={}",
            list_id, item.id
        );
        Ok(item)
    }

    /// Replaces title and description of an owned list.
    pub fn edit_list(
        &self,
        principal: &str,
        id: ListId,
        title: &str,
        description: &str,
    ) -> TodoServiceResult<ActionOutcome> {
        if self.authorize_list(principal, id)?.is_some() {
            let changed = self.repo.update_list_fields(id, title, description)?;
            info!("event=list_edit module=service status=ok list_id={id} changed={changed}");
        }
        Ok(ActionOutcome::RedirectToLists)
    }

    /// Deletes an owned list together with its items.
    pub fn delete_list(&self, principal: &str, id: ListId) -> TodoServiceResult<ActionOutcome> {
        if self.authorize_list(principal, id)?.is_some() {
            let removed = self.repo.delete_list(id)?;
            info!("event=list_delete module=service status=ok list_id={id} removed={removed}");
        }
        Ok(ActionOutcome::RedirectToLists)
    }

    /// Replaces the title of an owned item.
    pub fn edit_item(
        &self,
        principal: &str,
        id: ItemId,
        title: &str,
    ) -> TodoServiceResult<ActionOutcome> {
        if self.authorize_item(principal, id)?.is_some() {
            let changed = self.repo.update_item_title(id, title)?;
            info!("event=item_edit module=service status=ok item_id={id} changed={changed}");
        }
        Ok(ActionOutcome::RedirectToLists)
    }

    /// Deletes an owned item.
    pub fn delete_item(&self, principal: &str, id: ItemId) -> TodoServiceResult<ActionOutcome> {
        if self.authorize_item(principal, id)?.is_some() {
            let removed = self.repo.delete_item(id)?;
            info!("event=item_delete module=service status=ok item_id={id} removed={removed}");
        }
        Ok(ActionOutcome::RedirectToLists)
    }

    /// Sets the completion flag of an owned item.
    pub fn set_completion(
        &self,
        principal: &str,
        id: ItemId,
        is_done: bool,
    ) -> TodoServiceResult<CompletionStatus> {
        if self.authorize_item(principal, id)?.is_none() {
            debug!("event=item_completion module=service status=not_found item_id={id}");
            return Ok(CompletionStatus::NotFound);
        }
        // The row can vanish between the check and the write.
        if !self.repo.set_item_completion(id, is_done)? {
            return Ok(CompletionStatus::NotFound);
        }
        info!("event=item_completion module=service status=ok item_id={id} is_done={is_done}");
        Ok(CompletionStatus::Success)
    }

    /// Makes an owned item repeat every `interval`, or one-off when `None`.
    pub fn set_repetition(
        &self,
        principal: &str,
        id: ItemId,
        interval: Option<Duration>,
    ) -> TodoServiceResult<ActionOutcome> {
        if self.authorize_item(principal, id)?.is_some() {
            let changed = self.repo.set_item_repetition(id, interval)?;
            info!(
                "event=item_repetition module=service status=ok item_id={id} repeating={} changed={changed}",
                interval.is_some()
            );
        }
        Ok(ActionOutcome::RedirectToLists)
    }

    /// Loads a list if it exists, rejecting lists owned by someone else.
    fn authorize_list(&self, principal: &str, id: ListId) -> TodoServiceResult<Option<ToDoList>> {
        let principal = require_principal(principal)?;
        match self.repo.get_list(id)? {
            Some(list) if list.owner_id == principal => Ok(Some(list)),
            Some(_) => Err(unauthorized(principal, OwnedTarget::List(id))),
            None => Ok(None),
        }
    }

    /// Loads an item if it exists, rejecting items of foreign lists.
    fn authorize_item(&self, principal: &str, id: ItemId) -> TodoServiceResult<Option<ToDoItem>> {
        let principal = require_principal(principal)?;
        let Some(item) = self.repo.get_item(id)? else {
            return Ok(None);
        };
        match self.repo.get_list(item.list_id)? {
            Some(list) if list.owner_id == principal => Ok(Some(item)),
            Some(_) => Err(unauthorized(principal, OwnedTarget::Item(id))),
            // Parent already gone; the cascade will remove the item.
            None => Ok(None),
        }
    }
}

/// Rejects blank ids; anything else is compared and stored verbatim.
fn require_principal(principal: &str) -> TodoServiceResult<&str> {
    if principal.trim().is_empty() {
        return Err(TodoServiceError::Unauthenticated);
    }
    Ok(principal)
}

fn unauthorized(principal: &str, target: OwnedTarget) -> TodoServiceError {
    warn!("event=ownership_check module=service status=denied target=\"{target}\"");
    TodoServiceError::Unauthorized {
        principal_id: principal.to_string(),
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletionStatus, OwnedTarget, TodoServiceError};
    use crate::repo::todo_repo::RepoError;

    #[test]
    fn completion_status_serializes_as_tagged_object() {
        let success = serde_json::to_string(&CompletionStatus::Success).expect("serialize");
        assert_eq!(success, r#"{"status":"success"}"#);
        let not_found = serde_json::to_string(&CompletionStatus::NotFound).expect("serialize");
        assert_eq!(not_found, r#"{"status":"not_found"}"#);
    }

    #[test]
    fn repo_list_not_found_maps_to_service_variant() {
        let err = TodoServiceError::from(RepoError::ListNotFound(7));
        assert!(matches!(err, TodoServiceError::ListNotFound(7)));
    }

    #[test]
    fn unauthorized_message_names_target() {
        let err = TodoServiceError::Unauthorized {
            principal_id: "u2".to_string(),
            target: OwnedTarget::Item(3),
        };
        assert_eq!(err.to_string(), "principal u2 does not own item 3");
    }
}

//! Core domain logic for the multi-user to-do manager.
//! This crate is the single source of truth for ownership and seeding rules.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use bootstrap::{
    ensure_admin_membership, run_bootstrap, seed_roles_and_admin, BootstrapReport, SeedError,
};
pub use config::{load_config, AppConfig, ConfigError, RoleConfig, RoleConfigMap, ADMIN_ROLE};
pub use db::{open_db, open_db_in_memory, DbError};
pub use identity::store::{IdentityError, IdentityStore, Principal, SqliteIdentityStore};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::todo::{
    ItemId, ItemValidationError, ListId, ListWithItems, PrincipalId, ToDoItem, ToDoList,
};
pub use repo::todo_repo::{RepoError, RepoResult, SqliteTodoRepository, TodoRepository};
pub use service::todo_service::{
    ActionOutcome, CompletionStatus, ListsView, TodoService, TodoServiceError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

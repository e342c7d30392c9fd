//! To-do domain model.
//!
//! # Responsibility
//! - Define the list/item records shared by persistence and services.
//!
//! # Invariants
//! - Every item belongs to exactly one list, referenced by `list_id` only.
//! - Identifiers are assigned by storage and never reused.

pub mod todo;

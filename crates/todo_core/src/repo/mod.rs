//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence gateway contract for lists and items.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories trust the ids they are given; ownership is enforced above.
//! - Missing targets on update/delete are reported as `false`, not as errors.

pub mod todo_repo;

//! In-process identity store: accounts, roles and role membership.
//!
//! # Responsibility
//! - Resolve principals by email or id.
//! - Create accounts with hashed passwords and manage role membership.
//!
//! # Invariants
//! - Passwords are only ever persisted as Argon2 PHC strings.
//! - Email and role name lookups are case-insensitive.
//! - Role membership is a set; adding an existing membership is a no-op.

pub mod password;
pub mod store;

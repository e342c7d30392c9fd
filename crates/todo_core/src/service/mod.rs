//! Use-case service layer.
//!
//! # Responsibility
//! - Hold ownership rules on top of repository primitives.

pub mod todo_service;

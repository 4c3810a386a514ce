//! Domain records persisted through the generic repository.
//!
//! # Responsibility
//! - Define entity structs and their static column declarations.
//!
//! # Invariants
//! - Every entity is identified by a key generated on insert.
//! - Deletion is represented by the `is_deleted` tombstone column, which is
//!   owned by the repository and never mapped onto records.

pub mod customer;

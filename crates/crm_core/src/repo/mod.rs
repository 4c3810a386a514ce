//! Repository layer: generic persistence for any declared entity.
//!
//! # Responsibility
//! - Build parameterized SQL from entity metadata.
//! - Own connection and transaction boundaries per operation.
//! - Mint prefix-scoped sequence numbers for business codes.
//!
//! # Invariants
//! - Request-supplied values are only ever bound as parameters.
//! - Rows with `is_deleted = 1` are invisible to every read path.
//! - Mutating operations report failures as `Outcome::Failed`, never `Err`.

pub mod generic_repo;
pub mod sequence;
pub mod table_query;

pub use generic_repo::{Outcome, RepoError, RepoResult, Repository, RepositoryOptions, SqliteRepository};
pub use sequence::{format_sequence, SequenceGenerator, SEQUENCE_MAX, SEQUENCE_WIDTH};
pub use table_query::{SortDirection, TablePage, TableQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

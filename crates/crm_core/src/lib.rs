//! Core data-access layer for the CRM store.
//! Generic metadata-driven repository, row mapping, sequence codes and the
//! customer services built on top of them.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use db::{ConnectionProvider, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use mapping::{Entity, EntityMeta, FieldDef, Mapped, MappingWarning};
pub use model::customer::{Customer, CustomerId};
pub use repo::{
    Outcome, RepoError, RepoResult, Repository, RepositoryOptions, SequenceGenerator,
    SortDirection, SqliteRepository, TablePage, TableQuery,
};
pub use service::base_service::BaseService;
pub use service::customer_service::{CustomerService, ImportReport, ImportRowError};
pub use service::response::{ApiResponse, Pagination};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

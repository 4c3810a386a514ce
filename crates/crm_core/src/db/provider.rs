//! Process-wide connection provider.
//!
//! # Responsibility
//! - Hold the immutable database location shared by every repository.
//! - Hand out a fresh, bootstrapped connection per call.
//!
//! # Invariants
//! - The provider carries no per-request state; cloning it is cheap.

use super::{open_db_with_timeout, DbResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Vends new connections to one SQLite database file.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    db_path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl ConnectionProvider {
    pub fn new(db_path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
            busy_timeout,
        }
    }

    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Opens a new connection with migrations applied.
    ///
    /// Callers own the connection and drop it before returning.
    pub fn connect(&self) -> DbResult<Connection> {
        open_db_with_timeout(self.db_path.as_path(), self.busy_timeout)
    }

    /// Creates the database file and runs migrations once, up front.
    ///
    /// Useful before spawning concurrent workers so none of them pays for
    /// the first-time schema setup.
    pub fn initialize(&self) -> DbResult<()> {
        self.connect().map(drop)
    }
}

//! Prefix-scoped sequence numbers for human-readable business codes.
//!
//! # Responsibility
//! - Issue the next six-digit suffix for a code prefix (`KH202511` ->
//!   `000008`).
//! - Expose the current maximum to callers that insert a whole batch of
//!   codes inside their own transaction.
//!
//! # Invariants
//! - The maximum is only read while holding the database write lock
//!   (`IMMEDIATE` transaction), so concurrent issuers serialize.
//! - Issued numbers are recorded in `sequence_reservations`; a number handed
//!   out by `next_number` is never handed out again, even if its code is
//!   never inserted.
//! - Suffixes never exceed `SEQUENCE_MAX`.
//! - Prefixes match case-sensitively, in stored codes and reservations alike.

use crate::db::ConnectionProvider;
use crate::mapping::{entity_meta, Entity};
use crate::repo::generic_repo::{RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Instant;

pub const SEQUENCE_WIDTH: usize = 6;
pub const SEQUENCE_MAX: u32 = 999_999;

/// Formats a suffix as fixed-width, zero-padded decimal.
pub fn format_sequence(number: u32) -> RepoResult<String> {
    if number > SEQUENCE_MAX {
        return Err(RepoError::Rejected(format!(
            "sequence number {number} exceeds {SEQUENCE_WIDTH} digits"
        )));
    }
    Ok(format!("{number:0width$}", width = SEQUENCE_WIDTH))
}

/// Sequence generator bound to one code column of one entity table.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    provider: ConnectionProvider,
    table: String,
    code_column: String,
}

impl SequenceGenerator {
    /// Binds the generator to `code_field` of entity `T`.
    pub fn for_entity<T: Entity>(provider: ConnectionProvider, code_field: &str) -> RepoResult<Self> {
        let meta = entity_meta::<T>()?;
        let field = meta.lookup(code_field).ok_or_else(|| RepoError::UnknownColumn {
            table: meta.table().to_string(),
            column: code_field.to_string(),
        })?;
        Ok(Self {
            provider,
            table: meta.table().to_string(),
            code_column: field.column.clone(),
        })
    }

    /// Issues the next suffix for `prefix`, zero-padded to six digits.
    ///
    /// Runs in its own `IMMEDIATE` transaction and records the issued value.
    pub fn next_number(&self, prefix: &str) -> RepoResult<String> {
        let started_at = Instant::now();
        let mut conn = self.provider.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let next = self.current_max(&tx, prefix)? + 1;
        let formatted = format_sequence(next)?;
        tx.execute(
            "INSERT INTO sequence_reservations (prefix, last_value)
             VALUES (?1, ?2)
             ON CONFLICT(prefix) DO UPDATE SET last_value = excluded.last_value;",
            params![prefix, next],
        )?;
        tx.commit()?;

        info!(
            "event=sequence_next module=repo status=ok table={} prefix={} duration_ms={}",
            self.table,
            prefix,
            started_at.elapsed().as_millis()
        );
        Ok(formatted)
    }

    /// Returns the highest suffix used or reserved for `prefix`.
    ///
    /// Must run inside the caller's transaction, which should be opened
    /// `IMMEDIATE`. The call touches the prefix's reservation row first, so
    /// the write lock is held from here until the caller commits; numbers
    /// computed as `peek_max + offset` stay exclusive for that window.
    pub fn peek_max(&self, conn: &Connection, prefix: &str) -> RepoResult<u32> {
        if conn.is_autocommit() {
            return Err(RepoError::Rejected(
                "peek_max requires an open transaction".to_string(),
            ));
        }
        conn.execute(
            "INSERT OR IGNORE INTO sequence_reservations (prefix, last_value) VALUES (?1, 0);",
            [prefix],
        )?;
        self.current_max(conn, prefix)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn current_max(&self, conn: &Connection, prefix: &str) -> RepoResult<u32> {
        let sql = format!(
            "SELECT COALESCE(MAX(CAST(substr({column}, ?2, {SEQUENCE_WIDTH}) AS INTEGER)), 0)
             FROM {table}
             WHERE substr({column}, 1, ?3) = ?1
               AND is_deleted = 0;",
            column = self.code_column,
            table = self.table
        );
        let prefix_len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
        let stored: i64 = conn.query_row(
            &sql,
            params![prefix, prefix_len.saturating_add(1), prefix_len],
            |row| row.get(0),
        )?;

        let reserved: i64 = conn
            .query_row(
                "SELECT last_value FROM sequence_reservations WHERE prefix = ?1;",
                [prefix],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let current = stored.max(reserved).max(0);
        u32::try_from(current).map_err(|_| {
            RepoError::InvalidData(format!(
                "sequence value {current} for prefix `{prefix}` is out of range"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::format_sequence;

    #[test]
    fn formats_six_zero_padded_digits() {
        assert_eq!(format_sequence(8).unwrap(), "000008");
        assert_eq!(format_sequence(123_456).unwrap(), "123456");
        assert_eq!(format_sequence(0).unwrap(), "000000");
    }

    #[test]
    fn rejects_seven_digit_suffixes() {
        assert!(format_sequence(1_000_000).is_err());
    }
}

//! Generic repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide point lookup, batch insert, update, soft delete, uniqueness
//!   check and table query for any `Entity`.
//! - Keep SQL text generation inside this module; identifiers come from
//!   resolved metadata, values are always bound.
//!
//! # Invariants
//! - Each call opens its own connection and releases it before returning.
//! - A batch insert is all-or-nothing inside one transaction.
//! - Mutating calls never return `Err`; failures become `Outcome::Failed`.

use crate::db::{ConnectionProvider, DbError};
use crate::mapping::{
    entity_meta, map_row, ColumnValue, Entity, EntityKey, EntityMeta, MappedField, Mapped,
    MetaError,
};
use crate::repo::table_query::{
    build_predicate, order_clause, TablePage, TableQuery, DEFAULT_PAGE_SIZE,
};
use log::{error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for read paths and internal helpers.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Meta(MetaError),
    /// Caller named a column the entity does not map.
    UnknownColumn {
        table: String,
        column: String,
    },
    /// Stored data cannot be decoded into the requested type.
    InvalidData(String),
    /// Request rejected before or during execution.
    Rejected(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Meta(err) => write!(f, "{err}"),
            Self::UnknownColumn { table, column } => {
                write!(f, "table `{table}` has no mapped column `{column}`")
            }
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Rejected(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Meta(err) => Some(err),
            Self::UnknownColumn { .. } | Self::InvalidData(_) | Self::Rejected(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<MetaError> for RepoError {
    fn from(value: MetaError) -> Self {
        Self::Meta(value)
    }
}

/// Tri-state result of a mutating repository call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome<T = ()> {
    Success(T),
    /// No row matched; a normal outcome, not an error.
    NotFound,
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::NotFound => Outcome::NotFound,
            Self::Failed(message) => Outcome::Failed(message),
        }
    }
}

/// Tunables shared by every repository instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Insert binds blank (whitespace-only) text as `NULL`.
    pub blank_text_as_null: bool,
    /// Page size used when a table query asks for `0`.
    pub default_page_size: u32,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            blank_text_as_null: true,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Repository interface shared by all entities.
pub trait Repository<T: Entity> {
    /// Loads one visible record by primary key.
    fn get_by_key(&self, key: &T::Key) -> RepoResult<Option<Mapped<T>>>;
    /// Inserts a non-empty batch atomically and returns generated keys in
    /// input order.
    fn insert(&self, records: &[T]) -> Outcome<Vec<T::Key>>;
    /// Replaces every writable column of one record.
    fn update(&self, key: &T::Key, record: &T) -> Outcome;
    /// Marks the given keys deleted; returns the affected-row count.
    fn soft_delete(&self, keys: &[T::Key]) -> Outcome<usize>;
    /// Returns the stored value when a visible row already holds `value`.
    fn check_unique<V: ColumnValue>(&self, column: &str, value: &V) -> RepoResult<Option<V>>;
    /// Runs one filtered, searched, sorted, paginated listing query.
    fn query_table(&self, query: &TableQuery) -> RepoResult<TablePage<T>>;
}

/// SQLite-backed generic repository.
pub struct SqliteRepository<T: Entity> {
    provider: ConnectionProvider,
    meta: Arc<EntityMeta>,
    options: RepositoryOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqliteRepository<T> {
    /// Creates a repository, resolving `T`'s metadata up front.
    pub fn try_new(provider: ConnectionProvider) -> RepoResult<Self> {
        Ok(Self {
            provider,
            meta: entity_meta::<T>()?,
            options: RepositoryOptions::default(),
            _entity: PhantomData,
        })
    }

    pub fn with_options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    pub fn options(&self) -> RepositoryOptions {
        self.options
    }

    /// Inserts a batch on a caller-owned connection or transaction.
    ///
    /// The caller commits or rolls back; nothing here ends the transaction.
    pub fn insert_in(&self, conn: &Connection, records: &[T]) -> RepoResult<Vec<T::Key>> {
        if records.is_empty() {
            return Err(RepoError::Rejected("no data to insert".to_string()));
        }
        let sql = self.insert_sql()?;
        let writable: Vec<&MappedField> = self.meta.writable_fields().collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut keys = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let key = T::Key::generate();
            let mut values = Vec::with_capacity(writable.len() + 1);
            values.push(key.to_sql_value());
            for field in &writable {
                let value = self.read_writable(record, field)?;
                values.push(self.normalize_insert_value(value));
            }

            let affected = stmt.execute(params_from_iter(values))?;
            if affected == 0 {
                return Err(RepoError::Rejected(format!("insert failed for row {index}")));
            }
            keys.push(key);
        }

        Ok(keys)
    }

    /// Uniqueness probe on a caller-owned connection or transaction.
    pub fn check_unique_in<V: ColumnValue>(
        &self,
        conn: &Connection,
        column: &str,
        value: &V,
    ) -> RepoResult<Option<V>> {
        let field = self.meta.lookup(column).ok_or_else(|| RepoError::UnknownColumn {
            table: self.meta.table().to_string(),
            column: column.to_string(),
        })?;
        let column = field.column.as_str();
        let sql = format!(
            "SELECT {column} FROM {table} WHERE {column} = ?1 AND is_deleted = 0 LIMIT 1;",
            table = self.meta.table()
        );

        let found: Option<Value> = conn
            .query_row(&sql, [value.to_sql_value()], |row| row.get(0))
            .optional()?;
        match found {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => V::from_sql_value(raw).map(Some).map_err(|err| {
                RepoError::InvalidData(format!("{}.{column}: {err}", self.meta.table()))
            }),
        }
    }

    fn insert_sql(&self) -> RepoResult<String> {
        let mut columns = vec![self.meta.primary_key().column.as_str()];
        columns.extend(self.meta.writable_fields().map(|field| field.column.as_str()));
        if columns.len() == 1 {
            return Err(self.no_writable_fields());
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            self.meta.table(),
            columns.join(", ")
        ))
    }

    fn update_sql(&self) -> RepoResult<String> {
        let assignments: Vec<String> = self
            .meta
            .writable_fields()
            .map(|field| format!("{} = ?", field.column))
            .collect();
        if assignments.is_empty() {
            return Err(self.no_writable_fields());
        }
        Ok(format!(
            "UPDATE {} SET {} WHERE {} = ?;",
            self.meta.table(),
            assignments.join(", "),
            self.meta.primary_key().column
        ))
    }

    fn no_writable_fields(&self) -> RepoError {
        RepoError::Rejected(format!(
            "entity `{}` maps no writable fields",
            self.meta.entity()
        ))
    }

    fn read_writable(&self, record: &T, field: &MappedField) -> RepoResult<Value> {
        record.read_field(field.field).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "entity `{}` has no reader for mapped field `{}`",
                self.meta.entity(),
                field.field
            ))
        })
    }

    fn normalize_insert_value(&self, value: Value) -> Value {
        match value {
            Value::Text(text) if self.options.blank_text_as_null && text.trim().is_empty() => {
                Value::Null
            }
            other => other,
        }
    }

    fn try_insert(&self, records: &[T]) -> RepoResult<Vec<T::Key>> {
        let mut conn = self.provider.connect()?;
        let tx = conn.transaction()?;
        // Dropping `tx` on an early return rolls the whole batch back.
        let keys = self.insert_in(&tx, records)?;
        tx.commit()?;
        Ok(keys)
    }

    fn try_update(&self, key: &T::Key, record: &T) -> RepoResult<usize> {
        let sql = self.update_sql()?;
        let mut values = self
            .meta
            .writable_fields()
            .map(|field| self.read_writable(record, field))
            .collect::<RepoResult<Vec<Value>>>()?;
        values.push(key.to_sql_value());

        let mut conn = self.provider.connect()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        Ok(affected)
    }

    fn try_soft_delete(&self, keys: &[T::Key]) -> RepoResult<usize> {
        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "UPDATE {} SET is_deleted = 1 WHERE {} IN ({placeholders});",
            self.meta.table(),
            self.meta.primary_key().column
        );
        let conn = self.provider.connect()?;
        let affected = conn.execute(
            &sql,
            params_from_iter(keys.iter().map(|key| key.to_sql_value())),
        )?;
        Ok(affected)
    }

    fn fail<U>(&self, event: &str, started_at: Instant, err: RepoError) -> Outcome<U> {
        error!(
            "event={event} module=repo status=error table={} duration_ms={} error={}",
            self.meta.table(),
            started_at.elapsed().as_millis(),
            err
        );
        Outcome::Failed(err.to_string())
    }
}

impl<T: Entity> Repository<T> for SqliteRepository<T> {
    fn get_by_key(&self, key: &T::Key) -> RepoResult<Option<Mapped<T>>> {
        let conn = self.provider.connect()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 AND is_deleted = 0;",
            self.meta.table(),
            self.meta.primary_key().column
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([key.to_sql_value()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(map_row(row, &self.meta)));
        }

        Ok(None)
    }

    fn insert(&self, records: &[T]) -> Outcome<Vec<T::Key>> {
        let started_at = Instant::now();
        if records.is_empty() {
            warn!(
                "event=repo_insert module=repo status=rejected table={} reason=empty_batch",
                self.meta.table()
            );
            return Outcome::Failed("no data to insert".to_string());
        }
        if let Err(err) = self.insert_sql() {
            return self.fail("repo_insert", started_at, err);
        }

        match self.try_insert(records) {
            Ok(keys) => {
                info!(
                    "event=repo_insert module=repo status=ok table={} rows={} duration_ms={}",
                    self.meta.table(),
                    keys.len(),
                    started_at.elapsed().as_millis()
                );
                Outcome::Success(keys)
            }
            Err(err) => self.fail("repo_insert", started_at, err),
        }
    }

    fn update(&self, key: &T::Key, record: &T) -> Outcome {
        let started_at = Instant::now();
        match self.try_update(key, record) {
            Ok(0) => {
                info!(
                    "event=repo_update module=repo status=not_found table={} duration_ms={}",
                    self.meta.table(),
                    started_at.elapsed().as_millis()
                );
                Outcome::NotFound
            }
            Ok(_) => {
                info!(
                    "event=repo_update module=repo status=ok table={} duration_ms={}",
                    self.meta.table(),
                    started_at.elapsed().as_millis()
                );
                Outcome::Success(())
            }
            Err(err) => self.fail("repo_update", started_at, err),
        }
    }

    fn soft_delete(&self, keys: &[T::Key]) -> Outcome<usize> {
        let started_at = Instant::now();
        if keys.is_empty() {
            warn!(
                "event=repo_soft_delete module=repo status=rejected table={} reason=empty_keys",
                self.meta.table()
            );
            return Outcome::Failed("no keys to delete".to_string());
        }

        match self.try_soft_delete(keys) {
            Ok(0) => Outcome::NotFound,
            Ok(affected) => {
                info!(
                    "event=repo_soft_delete module=repo status=ok table={} rows={} duration_ms={}",
                    self.meta.table(),
                    affected,
                    started_at.elapsed().as_millis()
                );
                Outcome::Success(affected)
            }
            Err(err) => self.fail("repo_soft_delete", started_at, err),
        }
    }

    fn check_unique<V: ColumnValue>(&self, column: &str, value: &V) -> RepoResult<Option<V>> {
        let conn = self.provider.connect()?;
        self.check_unique_in(&conn, column, value)
    }

    fn query_table(&self, query: &TableQuery) -> RepoResult<TablePage<T>> {
        let started_at = Instant::now();
        let table = self.meta.table();
        let predicate = build_predicate(&self.meta, query);
        let page_no = query.effective_page_no();
        let page_size = query.effective_page_size(self.options.default_page_size);
        let offset = query.offset(self.options.default_page_size);

        let conn = self.provider.connect()?;

        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {};", predicate.sql);
        let total: i64 = conn.query_row(
            &count_sql,
            params_from_iter(predicate.params.iter()),
            |row| row.get(0),
        )?;

        let page_sql = format!(
            "SELECT * FROM {table} WHERE {} {} LIMIT ? OFFSET ?;",
            predicate.sql,
            order_clause(&self.meta, query)
        );
        let mut page_params = predicate.params.clone();
        page_params.push(Value::Integer(i64::from(page_size)));
        page_params.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let mut stmt = conn.prepare(&page_sql)?;
        let mut rows = stmt.query(params_from_iter(page_params))?;
        let mut mapped = Vec::new();
        while let Some(row) = rows.next()? {
            mapped.push(map_row(row, &self.meta));
        }

        info!(
            "event=table_query module=repo status=ok table={table} rows={} total={total} duration_ms={}",
            mapped.len(),
            started_at.elapsed().as_millis()
        );

        Ok(TablePage {
            rows: mapped,
            total: u64::try_from(total).unwrap_or_default(),
            page_no,
            page_size,
        })
    }
}

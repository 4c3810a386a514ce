//! Row mapper: one result row into one typed record.
//!
//! # Responsibility
//! - Look up every mapped field by its resolved column name.
//! - Leave SQL `NULL` columns at the field's default value.
//! - Coerce everything else through the entity's field setter.
//!
//! # Invariants
//! - A failing field never aborts the row; it is reported as a
//!   `MappingWarning` and left at its default.
//! - Warnings are logged with field and column names only, never values.

use super::meta::{Entity, EntityMeta};
use log::warn;
use rusqlite::types::Value;
use rusqlite::Row;

/// Diagnostic for one field that could not be populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingWarning {
    pub field: &'static str,
    pub column: String,
    pub reason: String,
}

/// A mapped record plus the fields that were skipped while mapping it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped<T> {
    pub record: T,
    pub warnings: Vec<MappingWarning>,
}

impl<T> Mapped<T> {
    /// `true` when every mapped field was populated or legitimately `NULL`.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

/// Maps one SQLite row into `T`.
pub fn map_row<T: Entity>(row: &Row<'_>, meta: &EntityMeta) -> Mapped<T> {
    map_columns(meta, |column| {
        row.get::<_, Value>(column).map_err(|err| err.to_string())
    })
}

/// Maps a record from any column source.
///
/// `fetch` returns the raw value for a column name, or a reason when the
/// column cannot be read at all.
pub fn map_columns<T, F>(meta: &EntityMeta, mut fetch: F) -> Mapped<T>
where
    T: Entity,
    F: FnMut(&str) -> Result<Value, String>,
{
    let mut record = T::default();
    let mut warnings = Vec::new();

    for field in meta.fields() {
        let raw = match fetch(field.column.as_str()) {
            Ok(Value::Null) => continue,
            Ok(raw) => raw,
            Err(reason) => {
                warnings.push(MappingWarning {
                    field: field.field,
                    column: field.column.clone(),
                    reason,
                });
                continue;
            }
        };

        if let Err(err) = record.write_field(field.field, raw) {
            warnings.push(MappingWarning {
                field: field.field,
                column: field.column.clone(),
                reason: err.to_string(),
            });
        }
    }

    for warning in &warnings {
        warn!(
            "event=row_map module=mapping status=partial table={} field={} column={}",
            meta.table(),
            warning.field,
            warning.column
        );
    }

    Mapped { record, warnings }
}

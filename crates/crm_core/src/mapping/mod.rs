//! Entity metadata, value coercion and row mapping.
//!
//! # Responsibility
//! - Describe how record fields correspond to table columns.
//! - Convert typed field values to and from SQLite values.
//! - Turn one result row into a typed record without aborting on bad fields.
//!
//! # Invariants
//! - Table and column identifiers only ever come from static entity
//!   declarations, never from request input.
//! - Metadata resolution is pure; memoization is an optimization only.

pub mod meta;
pub mod row_mapper;
pub mod value;

pub use meta::{entity_meta, resolve_fields, Entity, EntityMeta, FieldDef, MappedField, MetaError};
pub use row_mapper::{map_columns, map_row, Mapped, MappingWarning};
pub use value::{CoercionError, ColumnValue, EntityKey};

//! Column metadata resolver.
//!
//! # Responsibility
//! - Resolve the ordered `(field, column)` mapping for an entity type.
//! - Identify the single primary-key field and its column.
//! - Cache resolved metadata per type for the process lifetime.
//!
//! # Invariants
//! - An explicit column marker wins; the primary-key marker is the fallback
//!   column name; unmarked fields are excluded from the mapped list.
//! - Exactly one primary-key field per entity type.
//! - Every identifier is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).

use super::value::{CoercionError, EntityKey};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

static META_CACHE: Lazy<Mutex<HashMap<TypeId, Arc<EntityMeta>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A record type persisted through the generic repository.
///
/// Implementations declare their field table statically and provide
/// name-based accessors, so adding a mapped field never touches SQL code.
pub trait Entity: Default + Send + 'static {
    /// Primary key type, generated on insert.
    type Key: EntityKey;

    /// Type name; the table name is its lower-cased form.
    const TYPE_NAME: &'static str;

    /// Declared fields in column order.
    fn field_defs() -> &'static [FieldDef];

    /// Returns the current value of `field` as a SQLite value.
    fn read_field(&self, field: &str) -> Option<Value>;

    /// Coerces `value` into `field`.
    fn write_field(&mut self, field: &str, value: Value) -> Result<(), CoercionError>;
}

/// Static declaration of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub column: Option<&'static str>,
    pub primary_key: Option<&'static str>,
    pub read_only: bool,
}

impl FieldDef {
    /// Field carrying an explicit column-name marker.
    pub const fn column(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column: Some(column),
            primary_key: None,
            read_only: false,
        }
    }

    /// Primary-key field; the marker doubles as its column name.
    pub const fn primary_key(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column: None,
            primary_key: Some(column),
            read_only: false,
        }
    }

    /// Mapped for reads, never bound on insert/update (store-managed columns).
    pub const fn read_only(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column: Some(column),
            primary_key: None,
            read_only: true,
        }
    }

    /// Field that lives on the record but has no column.
    pub const fn unmapped(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            primary_key: None,
            read_only: false,
        }
    }

    pub const fn is_mapped(&self) -> bool {
        self.column.is_some() || self.primary_key.is_some()
    }

    /// Column name after applying the marker precedence rules.
    pub fn resolved_column(&self) -> String {
        match (self.column, self.primary_key) {
            (Some(column), _) => column.to_string(),
            (None, Some(column)) => column.to_string(),
            (None, None) => self.name.to_ascii_lowercase(),
        }
    }
}

/// One resolved field-to-column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedField {
    pub field: &'static str,
    pub column: String,
    pub primary_key: bool,
    pub read_only: bool,
}

impl MappedField {
    /// Whether insert/update bind this field.
    pub fn is_writable(&self) -> bool {
        !self.primary_key && !self.read_only
    }
}

/// Resolved, immutable metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    entity: &'static str,
    table: String,
    fields: Vec<MappedField>,
    primary_key: usize,
}

impl EntityMeta {
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Mapped fields in declaration order, primary key included.
    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    pub fn primary_key(&self) -> &MappedField {
        &self.fields[self.primary_key]
    }

    /// Fields bound by insert and update statements.
    pub fn writable_fields(&self) -> impl Iterator<Item = &MappedField> {
        self.fields.iter().filter(|field| field.is_writable())
    }

    /// Finds a mapped field by case-insensitive field name or exact column.
    ///
    /// Returns `None` for anything else, which callers treat as "ignore".
    pub fn lookup(&self, key: &str) -> Option<&MappedField> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        self.fields
            .iter()
            .find(|field| field.field.eq_ignore_ascii_case(key))
            .or_else(|| self.fields.iter().find(|field| field.column == key))
    }
}

/// Errors raised while resolving an entity declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    MissingPrimaryKey {
        entity: &'static str,
    },
    DuplicatePrimaryKey {
        entity: &'static str,
        first: &'static str,
        second: &'static str,
    },
    InvalidIdentifier {
        entity: &'static str,
        identifier: String,
    },
}

impl Display for MetaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPrimaryKey { entity } => {
                write!(f, "entity `{entity}` declares no primary key field")
            }
            Self::DuplicatePrimaryKey {
                entity,
                first,
                second,
            } => write!(
                f,
                "entity `{entity}` declares more than one primary key: `{first}`, `{second}`"
            ),
            Self::InvalidIdentifier { entity, identifier } => {
                write!(f, "entity `{entity}` uses invalid SQL identifier `{identifier}`")
            }
        }
    }
}

impl Error for MetaError {}

/// Resolves metadata for `T`, memoized per type.
pub fn entity_meta<T: Entity>() -> Result<Arc<EntityMeta>, MetaError> {
    let type_id = TypeId::of::<T>();
    if let Some(meta) = META_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return Ok(Arc::clone(meta));
    }

    let meta = Arc::new(resolve_fields(T::TYPE_NAME, T::field_defs())?);
    let mut cache = META_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(cache.entry(type_id).or_insert(meta)))
}

/// Resolves a field declaration table. Pure; no caching.
pub fn resolve_fields(
    entity: &'static str,
    defs: &'static [FieldDef],
) -> Result<EntityMeta, MetaError> {
    let table = entity.to_ascii_lowercase();
    ensure_identifier(entity, &table)?;

    let mut fields = Vec::new();
    let mut primary_key: Option<usize> = None;

    for def in defs.iter().filter(|def| def.is_mapped()) {
        let column = def.resolved_column();
        ensure_identifier(entity, &column)?;

        let is_primary_key = def.primary_key.is_some();
        if is_primary_key {
            if let Some(existing) = primary_key {
                let first: &MappedField = &fields[existing];
                return Err(MetaError::DuplicatePrimaryKey {
                    entity,
                    first: first.field,
                    second: def.name,
                });
            }
            primary_key = Some(fields.len());
        }

        fields.push(MappedField {
            field: def.name,
            column,
            primary_key: is_primary_key,
            read_only: def.read_only,
        });
    }

    let primary_key = primary_key.ok_or(MetaError::MissingPrimaryKey { entity })?;
    Ok(EntityMeta {
        entity,
        table,
        fields,
        primary_key,
    })
}

fn ensure_identifier(entity: &'static str, identifier: &str) -> Result<(), MetaError> {
    let mut chars = identifier.chars();
    let valid_head = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    let valid_tail = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid_head && valid_tail {
        Ok(())
    } else {
        Err(MetaError::InvalidIdentifier {
            entity,
            identifier: identifier.to_string(),
        })
    }
}

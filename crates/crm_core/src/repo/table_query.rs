//! Table-query request model and SQL predicate builder.
//!
//! # Responsibility
//! - Describe one paginated, filtered, searched and sorted listing request.
//! - Translate it into a `WHERE` predicate, `ORDER BY` clause and bind list.
//!
//! # Invariants
//! - The base predicate is always `is_deleted = 0`.
//! - Filters are AND-combined equality checks; searches are one OR group of
//!   `LIKE` checks AND-combined with the rest.
//! - Keys that do not resolve through entity metadata are dropped.
//! - Search text is escaped so `%`, `_` and `\` match literally.

use crate::mapping::{EntityMeta, Mapped};
use log::debug;
use rusqlite::types::Value;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_SORT_COLUMN: &str = "created_at";
const LIKE_ESCAPE: char = '\\';

/// Sort direction for table queries.
///
/// Serializes as `ASC`/`DESC`; deserializes through [`SortDirection::parse`],
/// so unknown text and `null` read as ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::Asc, Self::parse))
    }
}

impl SortDirection {
    /// Parses `ASC`/`DESC` case-insensitively; anything else is ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Listing request: page, sort, exact filters and substring searches.
///
/// Map keys are field names (case-insensitive) or column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableQuery {
    /// 1-based; `0` is read as page 1. Negative input deserializes as `0`.
    #[serde(deserialize_with = "lenient_count")]
    pub page_no: u32,
    /// `0` falls back to the default page size.
    #[serde(deserialize_with = "lenient_count")]
    pub page_size: u32,
    pub sort_key: Option<String>,
    pub sort_type: SortDirection,
    #[serde(deserialize_with = "null_as_empty")]
    pub filters: BTreeMap<String, String>,
    #[serde(rename = "searchValue", deserialize_with = "null_as_empty")]
    pub search: BTreeMap<String, String>,
}

/// Signed or missing counts: negatives become `0`, overflow saturates.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl TableQuery {
    pub fn page(page_no: u32, page_size: u32) -> Self {
        Self {
            page_no,
            page_size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort_key: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_key = Some(sort_key.into());
        self.sort_type = direction;
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn search(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.search.insert(key.into(), value.into());
        self
    }

    pub fn effective_page_no(&self) -> u32 {
        self.page_no.max(1)
    }

    pub fn effective_page_size(&self, default_page_size: u32) -> u32 {
        match self.page_size {
            0 => default_page_size.clamp(1, MAX_PAGE_SIZE),
            size => size.min(MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self, default_page_size: u32) -> u64 {
        u64::from(self.effective_page_no() - 1) * u64::from(self.effective_page_size(default_page_size))
    }
}

/// One page of a table query plus the unpaged match count.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage<T> {
    pub rows: Vec<Mapped<T>>,
    pub total: u64,
    pub page_no: u32,
    pub page_size: u32,
}

impl<T> TablePage<T> {
    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|row| &row.record)
    }

    pub fn into_records(self) -> Vec<T> {
        self.rows.into_iter().map(Mapped::into_record).collect()
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

/// `WHERE` body and its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn build_predicate(meta: &EntityMeta, query: &TableQuery) -> Predicate {
    let mut sql = String::from("is_deleted = 0");
    let mut params = Vec::new();

    for (key, value) in &query.filters {
        if value.is_empty() {
            continue;
        }
        let Some(field) = meta.lookup(key) else {
            debug!(
                "event=table_query module=repo status=filter_dropped table={} key={}",
                meta.table(),
                key
            );
            continue;
        };
        sql.push_str(&format!(" AND {} = ?", field.column));
        params.push(Value::Text(value.clone()));
    }

    let mut search_clauses = Vec::new();
    for (key, value) in &query.search {
        if value.is_empty() {
            continue;
        }
        let Some(field) = meta.lookup(key) else {
            debug!(
                "event=table_query module=repo status=search_dropped table={} key={}",
                meta.table(),
                key
            );
            continue;
        };
        search_clauses.push(format!("{} LIKE ? ESCAPE '{LIKE_ESCAPE}'", field.column));
        params.push(Value::Text(format!("%{}%", escape_like(value))));
    }
    if !search_clauses.is_empty() {
        sql.push_str(&format!(" AND ({})", search_clauses.join(" OR ")));
    }

    Predicate { sql, params }
}

pub(crate) fn order_clause(meta: &EntityMeta, query: &TableQuery) -> String {
    let sort_column = query
        .sort_key
        .as_deref()
        .and_then(|key| meta.lookup(key))
        .map_or(DEFAULT_SORT_COLUMN, |field| field.column.as_str());
    let direction = query.sort_type.as_sql();
    let key_column = meta.primary_key().column.as_str();

    if sort_column == key_column {
        format!("ORDER BY {sort_column} {direction}")
    } else {
        format!("ORDER BY {sort_column} {direction}, {key_column} ASC")
    }
}

/// Escapes `LIKE` wildcards so the value matches as a literal substring.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{build_predicate, escape_like, order_clause, SortDirection, TableQuery};
    use crate::mapping::{resolve_fields, FieldDef};
    use rusqlite::types::Value;

    const FIELDS: &[FieldDef] = &[
        FieldDef::primary_key("customer_id", "customer_id"),
        FieldDef::column("full_name", "full_name"),
        FieldDef::column("phone", "phone"),
        FieldDef::column("email", "email"),
        FieldDef::read_only("created_at", "created_at"),
    ];

    #[test]
    fn base_predicate_only_hides_deleted_rows() {
        let meta = resolve_fields("Customer", FIELDS).unwrap();
        let predicate = build_predicate(&meta, &TableQuery::page(1, 10));
        assert_eq!(predicate.sql, "is_deleted = 0");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn filters_and_searches_combine_with_bound_values() {
        let meta = resolve_fields("Customer", FIELDS).unwrap();
        let query = TableQuery::page(1, 10)
            .filter("Phone", "0901")
            .search("full_name", "an")
            .search("EMAIL", "example");

        let predicate = build_predicate(&meta, &query);

        assert_eq!(
            predicate.sql,
            "is_deleted = 0 AND phone = ? AND (email LIKE ? ESCAPE '\\' OR full_name LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            predicate.params,
            vec![
                Value::Text("0901".into()),
                Value::Text("%example%".into()),
                Value::Text("%an%".into()),
            ]
        );
    }

    #[test]
    fn unknown_and_empty_keys_are_dropped() {
        let meta = resolve_fields("Customer", FIELDS).unwrap();
        let query = TableQuery::page(1, 10)
            .filter("1=1 OR phone", "x")
            .filter("email", "")
            .search("password", "secret");

        let predicate = build_predicate(&meta, &query);

        assert_eq!(predicate.sql, "is_deleted = 0");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn order_defaults_to_created_at_and_rejects_unknown_sort_keys() {
        let meta = resolve_fields("Customer", FIELDS).unwrap();

        let default_order = order_clause(&meta, &TableQuery::page(1, 10));
        assert_eq!(default_order, "ORDER BY created_at ASC, customer_id ASC");

        let injected = TableQuery::page(1, 10).sorted_by("full_name; DROP TABLE customer", SortDirection::Desc);
        assert_eq!(
            order_clause(&meta, &injected),
            "ORDER BY created_at DESC, customer_id ASC"
        );

        let camel_case = TableQuery::page(1, 10).sorted_by("FullName", SortDirection::Asc);
        assert_eq!(order_clause(&meta, &camel_case), "ORDER BY created_at ASC, customer_id ASC");

        let by_column = TableQuery::page(1, 10).sorted_by("full_name", SortDirection::Desc);
        assert_eq!(
            order_clause(&meta, &by_column),
            "ORDER BY full_name DESC, customer_id ASC"
        );
    }

    #[test]
    fn paging_is_one_based_with_floor_and_clamp() {
        assert_eq!(TableQuery::page(1, 2).offset(10), 0);
        assert_eq!(TableQuery::page(3, 2).offset(10), 4);
        assert_eq!(TableQuery::page(0, 2).offset(10), 0);
        assert_eq!(TableQuery::page(1, 0).effective_page_size(25), 25);
        assert_eq!(TableQuery::page(1, 50_000).effective_page_size(10), 1000);
    }

    #[test]
    fn sort_direction_parses_loosely() {
        assert_eq!(SortDirection::parse("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse(" DESC "), SortDirection::Desc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Asc);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let json = r#"{
            "pageNo": 2,
            "pageSize": 20,
            "sortKey": "full_name",
            "sortType": "DESC",
            "filters": {"customer_type": "VIP"},
            "searchValue": {"email": "gmail"}
        }"#;
        let query: TableQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.page_no, 2);
        assert_eq!(query.sort_type, SortDirection::Desc);
        assert_eq!(query.filters.get("customer_type").map(String::as_str), Some("VIP"));
        assert_eq!(query.search.get("email").map(String::as_str), Some("gmail"));

        let loose = r#"{
            "pageNo": -1,
            "pageSize": -5,
            "sortType": "dEsC",
            "filters": null,
            "searchValue": null
        }"#;
        let query: TableQuery = serde_json::from_str(loose).unwrap();
        assert_eq!(query.page_no, 0);
        assert_eq!(query.effective_page_no(), 1);
        assert_eq!(query.effective_page_size(10), 10);
        assert_eq!(query.sort_type, SortDirection::Desc);
        assert!(query.filters.is_empty());
        assert!(query.search.is_empty());

        for sort_type in [r#""sideways""#, r#""""#, "null"] {
            let json = format!(r#"{{"sortType": {sort_type}}}"#);
            let query: TableQuery = serde_json::from_str(&json).unwrap();
            assert_eq!(query.sort_type, SortDirection::Asc, "sortType={sort_type}");
        }

        let empty: TableQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, TableQuery::default());
    }

    #[test]
    fn sort_direction_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&SortDirection::Desc).unwrap(), r#""DESC""#);
        assert_eq!(serde_json::to_string(&SortDirection::Asc).unwrap(), r#""ASC""#);
    }
}

use chrono::NaiveDate;
use chrono::NaiveDateTime;
use crm_core::db::ConnectionProvider;
use crm_core::mapping::{CoercionError, ColumnValue, Entity, FieldDef};
use crm_core::repo::RepoError;
use crm_core::{Customer, Outcome, Repository, RepositoryOptions, SqliteRepository};
use rusqlite::types::Value;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn setup() -> (TempDir, ConnectionProvider, SqliteRepository<Customer>) {
    let dir = tempfile::tempdir().unwrap();
    let provider = ConnectionProvider::new(dir.path().join("crm.db"), Duration::from_secs(2));
    provider.initialize().unwrap();
    let repo = SqliteRepository::<Customer>::try_new(provider.clone()).unwrap();
    (dir, provider, repo)
}

fn full_customer() -> Customer {
    let mut customer = Customer::new("Nguyen Van An", "0901234567", "an@example.com")
        .with_code("KH202511000001");
    customer.zalo = Some("0901234567".to_string());
    customer.address = Some("12 Tran Phu, Ha Noi".to_string());
    customer.tax_code = Some("0101234567".to_string());
    customer.customer_type = Some("VIP".to_string());
    customer.shipping_address = Some("Kho 3".to_string());
    customer.last_purchase_date = Some(
        NaiveDate::from_ymd_opt(2025, 11, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    );
    customer.purchased_items = Some("laptop, mouse".to_string());
    customer.last_purchased_item = Some("mouse".to_string());
    customer
}

#[test]
fn inserted_customer_reads_back_equal() {
    let (_dir, _provider, repo) = setup();
    let original = full_customer();

    let keys = repo.insert(std::slice::from_ref(&original)).success().unwrap();
    assert_eq!(keys.len(), 1);
    assert_ne!(keys[0], Uuid::nil());

    let mapped = repo.get_by_key(&keys[0]).unwrap().unwrap();
    assert!(mapped.is_complete(), "warnings: {:?}", mapped.warnings);
    let stored = mapped.record;
    assert!(stored.created_at.is_some());

    let mut expected = original;
    expected.customer_id = keys[0];
    expected.created_at = stored.created_at;
    assert_eq!(stored, expected);
}

#[test]
fn every_insert_gets_a_fresh_key() {
    let (_dir, _provider, repo) = setup();
    let batch = vec![
        Customer::new("Ann", "0900000001", "ann@example.com"),
        Customer::new("Bob", "0900000002", "bob@example.com"),
        Customer::new("Cara", "0900000003", "cara@example.com"),
    ];

    let keys = repo.insert(&batch).success().unwrap();
    assert_eq!(keys.len(), 3);
    assert_ne!(keys[0], keys[1]);
    assert_ne!(keys[1], keys[2]);
    for (key, customer) in keys.iter().zip(&batch) {
        let stored = repo.get_by_key(key).unwrap().unwrap().record;
        assert_eq!(stored.full_name, customer.full_name);
    }
}

#[test]
fn failing_row_rolls_back_the_whole_batch() {
    let (_dir, provider, repo) = setup();
    provider
        .connect()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_mallory BEFORE INSERT ON customer
             WHEN NEW.full_name = 'Mallory'
             BEGIN SELECT RAISE(ABORT, 'mallory is not allowed'); END;",
        )
        .unwrap();

    let batch = vec![
        Customer::new("Ann", "0900000001", "ann@example.com"),
        Customer::new("Mallory", "0900000002", "mallory@example.com"),
    ];
    let outcome = repo.insert(&batch);
    assert!(outcome.error_message().unwrap().contains("mallory is not allowed"));

    let rows: i64 = provider
        .connect()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM customer;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn empty_batch_is_a_failure_without_io() {
    let (_dir, _provider, repo) = setup();
    assert_eq!(
        repo.insert(&[]),
        Outcome::Failed("no data to insert".to_string())
    );
    assert!(matches!(repo.soft_delete(&[]), Outcome::Failed(_)));
}

#[test]
fn blank_text_is_stored_as_null_on_insert() {
    let (_dir, provider, repo) = setup();
    let mut customer = Customer::new("Ann", "0900000001", "ann@example.com");
    customer.address = Some("   ".to_string());
    let key = repo.insert(&[customer]).success().unwrap()[0];

    let address: Option<String> = provider
        .connect()
        .unwrap()
        .query_row(
            "SELECT address FROM customer WHERE customer_id = ?1;",
            [key.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(address, None);

    let keep_blank = SqliteRepository::<Customer>::try_new(provider.clone())
        .unwrap()
        .with_options(RepositoryOptions {
            blank_text_as_null: false,
            ..RepositoryOptions::default()
        });
    let mut customer = Customer::new("Bob", "0900000002", "bob@example.com");
    customer.address = Some(String::new());
    let key = keep_blank.insert(&[customer]).success().unwrap()[0];
    let address: Option<String> = provider
        .connect()
        .unwrap()
        .query_row(
            "SELECT address FROM customer WHERE customer_id = ?1;",
            [key.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(address.as_deref(), Some(""));
}

#[test]
fn update_replaces_writable_fields_and_reports_missing_keys() {
    let (_dir, _provider, repo) = setup();
    let key = repo.insert(&[full_customer()]).success().unwrap()[0];

    let mut changed = repo.get_by_key(&key).unwrap().unwrap().record;
    changed.full_name = "Nguyen Van Binh".to_string();
    changed.customer_type = None;
    assert_eq!(repo.update(&key, &changed), Outcome::Success(()));

    let stored = repo.get_by_key(&key).unwrap().unwrap().record;
    assert_eq!(stored.full_name, "Nguyen Van Binh");
    assert_eq!(stored.customer_type, None);
    assert_eq!(stored.created_at, changed.created_at);

    assert_eq!(repo.update(&Uuid::new_v4(), &changed), Outcome::NotFound);
}

#[test]
fn soft_deleted_customers_are_not_found() {
    let (_dir, provider, repo) = setup();
    let batch = vec![
        Customer::new("Ann", "0900000001", "ann@example.com"),
        Customer::new("Bob", "0900000002", "bob@example.com"),
        Customer::new("Cara", "0900000003", "cara@example.com"),
    ];
    let keys = repo.insert(&batch).success().unwrap();

    assert_eq!(repo.soft_delete(&keys[..2]), Outcome::Success(2));
    assert!(repo.get_by_key(&keys[0]).unwrap().is_none());
    assert!(repo.get_by_key(&keys[1]).unwrap().is_none());
    assert!(repo.get_by_key(&keys[2]).unwrap().is_some());

    let tombstones: i64 = provider
        .connect()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM customer WHERE is_deleted = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tombstones, 2);

    assert_eq!(repo.soft_delete(&[Uuid::new_v4()]), Outcome::NotFound);
}

#[test]
fn missing_key_is_none_not_error() {
    let (_dir, _provider, repo) = setup();
    assert!(repo.get_by_key(&Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn check_unique_ignores_deleted_rows_and_unknown_columns() {
    let (_dir, _provider, repo) = setup();
    let key = repo
        .insert(&[Customer::new("Ann", "0900000001", "ann@example.com")])
        .success()
        .unwrap()[0];

    let found = repo
        .check_unique("email", &"ann@example.com".to_string())
        .unwrap();
    assert_eq!(found.as_deref(), Some("ann@example.com"));
    assert_eq!(
        repo.check_unique("EMAIL", &"ANN@example.com".to_string())
            .unwrap(),
        None
    );

    assert!(repo.soft_delete(&[key]).is_success());
    assert_eq!(
        repo.check_unique("email", &"ann@example.com".to_string())
            .unwrap(),
        None
    );

    let err = repo
        .check_unique("email; DROP TABLE customer", &"x".to_string())
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownColumn { .. }));
}

#[test]
fn bad_stored_value_becomes_a_warning_not_a_failure() {
    let (_dir, provider, repo) = setup();
    let key = repo.insert(&[full_customer()]).success().unwrap()[0];
    provider
        .connect()
        .unwrap()
        .execute(
            "UPDATE customer SET last_purchase_date = 'sometime soon' WHERE customer_id = ?1;",
            [key.to_string()],
        )
        .unwrap();

    let mapped = repo.get_by_key(&key).unwrap().unwrap();
    assert_eq!(mapped.warnings.len(), 1);
    assert_eq!(mapped.warnings[0].field, "last_purchase_date");
    assert_eq!(mapped.record.last_purchase_date, None);
    assert_eq!(mapped.record.full_name, "Nguyen Van An");
}

/// Key plus a store-managed column: nothing for insert or update to bind.
#[derive(Debug, Default)]
struct Stamp {
    stamp_id: Uuid,
    created_at: Option<NaiveDateTime>,
}

const STAMP_FIELDS: &[FieldDef] = &[
    FieldDef::primary_key("stamp_id", "stamp_id"),
    FieldDef::read_only("created_at", "created_at"),
];

impl Entity for Stamp {
    type Key = Uuid;
    const TYPE_NAME: &'static str = "Stamp";

    fn field_defs() -> &'static [FieldDef] {
        STAMP_FIELDS
    }

    fn read_field(&self, field: &str) -> Option<Value> {
        match field {
            "stamp_id" => Some(self.stamp_id.to_sql_value()),
            "created_at" => Some(self.created_at.to_sql_value()),
            _ => None,
        }
    }

    fn write_field(&mut self, field: &str, value: Value) -> Result<(), CoercionError> {
        match field {
            "stamp_id" => self.stamp_id = ColumnValue::from_sql_value(value)?,
            "created_at" => self.created_at = ColumnValue::from_sql_value(value)?,
            other => return Err(CoercionError::UnknownField(other.to_string())),
        }
        Ok(())
    }
}

#[test]
fn entity_without_writable_fields_cannot_insert_or_update() {
    let (_dir, provider, _repo) = setup();
    provider
        .connect()
        .unwrap()
        .execute_batch(
            "CREATE TABLE stamp (
                stamp_id TEXT PRIMARY KEY NOT NULL,
                created_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0
            );",
        )
        .unwrap();
    let stamps = SqliteRepository::<Stamp>::try_new(provider.clone()).unwrap();
    let message = "entity `Stamp` maps no writable fields";

    assert_eq!(
        stamps.insert(&[Stamp::default()]),
        Outcome::Failed(message.to_string())
    );
    assert_eq!(
        stamps.update(&Uuid::new_v4(), &Stamp::default()),
        Outcome::Failed(message.to_string())
    );

    let rows: i64 = provider
        .connect()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM stamp;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

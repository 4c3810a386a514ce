use crm_core::db::ConnectionProvider;
use crm_core::repo::{RepoError, SEQUENCE_MAX};
use crm_core::{Customer, Repository, SequenceGenerator, SqliteRepository};
use rusqlite::TransactionBehavior;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn setup() -> (TempDir, ConnectionProvider, SequenceGenerator) {
    let dir = tempfile::tempdir().unwrap();
    let provider = ConnectionProvider::new(dir.path().join("crm.db"), Duration::from_secs(10));
    provider.initialize().unwrap();
    let sequence =
        SequenceGenerator::for_entity::<Customer>(provider.clone(), "customer_code").unwrap();
    (dir, provider, sequence)
}

fn insert_codes(provider: &ConnectionProvider, codes: &[&str]) -> Vec<uuid::Uuid> {
    let repo = SqliteRepository::<Customer>::try_new(provider.clone()).unwrap();
    let batch: Vec<Customer> = codes
        .iter()
        .enumerate()
        .map(|(index, code)| {
            Customer::new(
                format!("Customer {index}"),
                format!("090000{index:04}"),
                format!("c{index}@example.com"),
            )
            .with_code(*code)
        })
        .collect();
    repo.insert(&batch).success().unwrap()
}

#[test]
fn next_number_follows_the_stored_maximum() {
    let (_dir, provider, sequence) = setup();
    insert_codes(
        &provider,
        &["KH202511000003", "KH202511000007", "KH202510000042"],
    );

    assert_eq!(sequence.next_number("KH202511").unwrap(), "000008");
}

#[test]
fn empty_prefix_range_starts_at_one() {
    let (_dir, _provider, sequence) = setup();
    assert_eq!(sequence.next_number("KH202512").unwrap(), "000001");
}

#[test]
fn prefixes_are_independent() {
    let (_dir, provider, sequence) = setup();
    insert_codes(&provider, &["KH202510000042"]);

    assert_eq!(sequence.next_number("KH202511").unwrap(), "000001");
    assert_eq!(sequence.next_number("KH202510").unwrap(), "000043");
}

#[test]
fn prefix_match_is_case_sensitive() {
    let (_dir, provider, sequence) = setup();
    insert_codes(&provider, &["KH202511000007", "KH_02511000050"]);

    assert_eq!(sequence.next_number("kh202511").unwrap(), "000001");
    assert_eq!(sequence.next_number("KH202511").unwrap(), "000008");
    assert_eq!(sequence.next_number("KH_02511").unwrap(), "000051");
}

#[test]
fn deleted_codes_do_not_count() {
    let (_dir, provider, sequence) = setup();
    let keys = insert_codes(&provider, &["KH202511000005", "KH202511000009"]);
    let repo = SqliteRepository::<Customer>::try_new(provider.clone()).unwrap();
    assert!(repo.soft_delete(&keys[1..]).is_success());

    assert_eq!(sequence.next_number("KH202511").unwrap(), "000006");
}

#[test]
fn sequential_calls_strictly_increase_without_inserts() {
    let (_dir, _provider, sequence) = setup();
    let issued: Vec<u32> = (0..20)
        .map(|_| sequence.next_number("KH202511").unwrap())
        .map(|suffix| {
            assert_eq!(suffix.len(), 6);
            suffix.parse().unwrap()
        })
        .collect();

    assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(issued.first(), Some(&1));
    assert_eq!(issued.last(), Some(&20));
}

#[test]
fn concurrent_callers_never_collide() {
    let (_dir, _provider, sequence) = setup();
    let workers = 8;
    let per_worker = 10;

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let sequence = sequence.clone();
            thread::spawn(move || {
                (0..per_worker)
                    .map(|_| sequence.next_number("KH202511").unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let distinct: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), workers * per_worker);
    assert_eq!(distinct.len(), all.len());
}

#[test]
fn peek_max_requires_a_transaction_and_holds_the_lock() {
    let (_dir, provider, sequence) = setup();
    insert_codes(&provider, &["KH202511000004"]);

    let autocommit = provider.connect().unwrap();
    assert!(matches!(
        sequence.peek_max(&autocommit, "KH202511"),
        Err(RepoError::Rejected(_))
    ));

    let mut conn = provider.connect().unwrap();
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();
    assert_eq!(sequence.peek_max(&tx, "KH202511").unwrap(), 4);

    let impatient = ConnectionProvider::new(provider.db_path(), Duration::from_millis(50));
    let blocked = SequenceGenerator::for_entity::<Customer>(impatient, "customer_code")
        .unwrap()
        .next_number("KH202511");
    assert!(blocked.is_err());

    tx.commit().unwrap();
    assert_eq!(sequence.next_number("KH202511").unwrap(), "000005");
}

#[test]
fn overflow_is_an_error_not_a_seventh_digit() {
    let (_dir, provider, sequence) = setup();
    let last_code = format!("KH202511{SEQUENCE_MAX}");
    insert_codes(&provider, &[last_code.as_str()]);

    let err = sequence.next_number("KH202511").unwrap_err();
    assert!(matches!(err, RepoError::Rejected(_)));
}

#[test]
fn unknown_code_field_is_rejected() {
    let (_dir, provider, _sequence) = setup();
    let err = SequenceGenerator::for_entity::<Customer>(provider, "nickname").unwrap_err();
    assert!(matches!(err, RepoError::UnknownColumn { .. }));
}

//! Customer use-case service.
//!
//! # Responsibility
//! - Expose customer CRUD and listing through `BaseService`.
//! - Validate and de-duplicate contact fields (`email`, `phone`).
//! - Issue `KH{yyyyMM}{nnnnnn}` customer codes, singly or for an import batch.
//!
//! # Invariants
//! - Import runs in one `IMMEDIATE` transaction: codes, duplicate probes and
//!   inserts see the same snapshot, and either every accepted row lands or
//!   none does.
//! - Codes are assigned to accepted rows only, so an import leaves no gaps.

use crate::db::ConnectionProvider;
use crate::model::customer::{Customer, CustomerId};
use crate::repo::{
    format_sequence, RepoResult, Repository, RepositoryOptions, SequenceGenerator,
    SqliteRepository, TableQuery,
};
use crate::service::base_service::{BaseService, OK_MESSAGE};
use crate::service::response::ApiResponse;
use crate::service::validation::{is_valid_email, is_valid_phone};
use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;

pub const CUSTOMER_CODE_PREFIX: &str = "KH";

/// Rejected import row. `phone` and `email` carry the reason, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRowError {
    /// 1-based position in the submitted batch.
    pub row: usize,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub codes: Vec<String>,
    pub errors: Vec<ImportRowError>,
}

/// Code prefix for the month containing `today`.
pub fn customer_code_prefix(today: NaiveDate) -> String {
    format!("{CUSTOMER_CODE_PREFIX}{}", today.format("%Y%m"))
}

pub struct CustomerService {
    base: BaseService<Customer, SqliteRepository<Customer>>,
    sequence: SequenceGenerator,
}

impl CustomerService {
    pub fn try_new(provider: ConnectionProvider) -> RepoResult<Self> {
        Self::with_options(provider, RepositoryOptions::default())
    }

    pub fn with_options(provider: ConnectionProvider, options: RepositoryOptions) -> RepoResult<Self> {
        let repo = SqliteRepository::<Customer>::try_new(provider.clone())?.with_options(options);
        let sequence = SequenceGenerator::for_entity::<Customer>(provider, "customer_code")?;
        Ok(Self {
            base: BaseService::new(repo, options.default_page_size),
            sequence,
        })
    }

    pub fn repo(&self) -> &SqliteRepository<Customer> {
        self.base.repo()
    }

    pub fn get_by_id(&self, customer_id: &CustomerId) -> ApiResponse<Customer> {
        self.base.get_by_id(customer_id)
    }

    pub fn insert(&self, customers: &[Customer]) -> ApiResponse<Vec<CustomerId>> {
        self.base.insert(customers)
    }

    pub fn update(&self, customer_id: &CustomerId, customer: &Customer) -> ApiResponse<String> {
        self.base.update(customer_id, customer)
    }

    pub fn delete(&self, customer_ids: &[CustomerId]) -> ApiResponse<usize> {
        self.base.delete(customer_ids)
    }

    pub fn load_table(&self, query: &TableQuery) -> ApiResponse<Vec<Customer>> {
        self.base.load_table(query)
    }

    /// Data is `"OK"` when the address is well formed and not taken.
    pub fn check_email(&self, email: &str) -> ApiResponse<String> {
        match self.email_problem(None, email) {
            Ok(None) => ApiResponse::ok(OK_MESSAGE.to_string()),
            Ok(Some(problem)) => ApiResponse::error(problem),
            Err(err) => ApiResponse::error(err.to_string()),
        }
    }

    /// Data is `"OK"` when the number is well formed and not taken.
    pub fn check_phone(&self, phone: &str) -> ApiResponse<String> {
        match self.phone_problem(None, phone) {
            Ok(None) => ApiResponse::ok(OK_MESSAGE.to_string()),
            Ok(Some(problem)) => ApiResponse::error(problem),
            Err(err) => ApiResponse::error(err.to_string()),
        }
    }

    /// Issues the next customer code for the month of `today`.
    pub fn create_customer_code(&self, today: NaiveDate) -> ApiResponse<String> {
        let prefix = customer_code_prefix(today);
        match self.sequence.next_number(&prefix) {
            Ok(suffix) => ApiResponse::ok(format!("{prefix}{suffix}")),
            Err(err) => ApiResponse::error(err.to_string()),
        }
    }

    /// Validates already-parsed rows and inserts the accepted ones with
    /// freshly assigned codes.
    ///
    /// Text fields are trimmed and any supplied `customer_code` is replaced.
    /// The envelope carries the report in both cases; `error` is set when at
    /// least one row was rejected or the batch failed as a whole.
    pub fn import_customers(
        &self,
        today: NaiveDate,
        drafts: Vec<Customer>,
    ) -> ApiResponse<ImportReport> {
        let started_at = Instant::now();
        let total = drafts.len();
        info!(
            "event=customer_import module=service status=start rows={}",
            total
        );

        match self.try_import(today, drafts) {
            Ok(report) => {
                info!(
                    "event=customer_import module=service status=ok rows={} inserted={} rejected={} duration_ms={}",
                    total,
                    report.inserted,
                    report.errors.len(),
                    started_at.elapsed().as_millis()
                );
                if report.errors.is_empty() {
                    ApiResponse::ok(report)
                } else {
                    let message = format!("{} of {} rows rejected", report.errors.len(), total);
                    ApiResponse {
                        data: Some(report),
                        meta: None,
                        error: Some(message),
                    }
                }
            }
            Err(err) => {
                warn!(
                    "event=customer_import module=service status=error rows={} duration_ms={} error={}",
                    total,
                    started_at.elapsed().as_millis(),
                    err
                );
                ApiResponse::error(err.to_string())
            }
        }
    }

    fn try_import(&self, today: NaiveDate, drafts: Vec<Customer>) -> RepoResult<ImportReport> {
        let mut report = ImportReport::default();
        if drafts.is_empty() {
            return Ok(report);
        }

        let prefix = customer_code_prefix(today);
        let mut conn = self.repo().provider().connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut next = self.sequence.peek_max(&tx, &prefix)?;
        let locked: &Connection = &tx;

        let mut seen_phones = HashSet::new();
        let mut seen_emails = HashSet::new();
        let mut accepted = Vec::with_capacity(drafts.len());

        for (index, draft) in drafts.into_iter().enumerate() {
            let mut customer = trimmed(draft);

            let mut phone_error = self.phone_problem(Some(locked), &customer.phone)?;
            if phone_error.is_none() && !seen_phones.insert(customer.phone.clone()) {
                phone_error = Some(format!("phone '{}' is repeated in the batch", customer.phone));
            }
            let mut email_error = self.email_problem(Some(locked), &customer.email)?;
            if email_error.is_none() && !seen_emails.insert(customer.email.clone()) {
                email_error = Some(format!("email '{}' is repeated in the batch", customer.email));
            }

            if phone_error.is_some() || email_error.is_some() {
                report.errors.push(ImportRowError {
                    row: index + 1,
                    full_name: customer.full_name,
                    phone: phone_error,
                    email: email_error,
                });
                continue;
            }

            next += 1;
            customer.customer_code = format!("{prefix}{}", format_sequence(next)?);
            accepted.push(customer);
        }

        if !accepted.is_empty() {
            self.repo().insert_in(&tx, &accepted)?;
        }
        tx.commit()?;

        report.inserted = accepted.len();
        report.codes = accepted.into_iter().map(|customer| customer.customer_code).collect();
        Ok(report)
    }

    fn email_problem(&self, conn: Option<&Connection>, email: &str) -> RepoResult<Option<String>> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(Some("email is required".to_string()));
        }
        if !is_valid_email(email) {
            return Ok(Some(format!("email '{email}' is not a valid address")));
        }
        let taken = self.probe(conn, "email", email)?;
        Ok(taken.map(|existing| format!("email '{existing}' already exists")))
    }

    fn phone_problem(&self, conn: Option<&Connection>, phone: &str) -> RepoResult<Option<String>> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Ok(Some("phone is required".to_string()));
        }
        if !is_valid_phone(phone) {
            return Ok(Some(format!("phone '{phone}' is not a valid number")));
        }
        let taken = self.probe(conn, "phone", phone)?;
        Ok(taken.map(|existing| format!("phone '{existing}' already exists")))
    }

    fn probe(&self, conn: Option<&Connection>, column: &str, value: &str) -> RepoResult<Option<String>> {
        let value = value.to_string();
        match conn {
            Some(conn) => self.repo().check_unique_in(conn, column, &value),
            None => self.repo().check_unique(column, &value),
        }
    }
}

fn trimmed(mut customer: Customer) -> Customer {
    fn trim_in_place(value: &mut String) {
        *value = value.trim().to_string();
    }
    fn trim_optional(value: &mut Option<String>) {
        if let Some(inner) = value.as_mut() {
            trim_in_place(inner);
        }
    }

    trim_in_place(&mut customer.full_name);
    trim_in_place(&mut customer.phone);
    trim_in_place(&mut customer.email);
    for field in [
        &mut customer.zalo,
        &mut customer.address,
        &mut customer.tax_code,
        &mut customer.customer_type,
        &mut customer.shipping_address,
        &mut customer.billing_address,
        &mut customer.purchased_items,
        &mut customer.last_purchased_item,
    ] {
        trim_optional(field);
    }
    customer.customer_code.clear();
    customer
}

#[cfg(test)]
mod tests {
    use super::{customer_code_prefix, trimmed};
    use crate::model::customer::Customer;
    use chrono::NaiveDate;

    #[test]
    fn prefix_uses_year_and_month() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 21).unwrap();
        assert_eq!(customer_code_prefix(today), "KH202511");
        let january = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        assert_eq!(customer_code_prefix(january), "KH202601");
    }

    #[test]
    fn import_rows_are_trimmed_and_lose_supplied_codes() {
        let mut draft = Customer::new("  Ann ", " 0901234567", "ann@example.com  ")
            .with_code("KH999999000001");
        draft.address = Some("  Hanoi ".to_string());

        let clean = trimmed(draft);
        assert_eq!(clean.full_name, "Ann");
        assert_eq!(clean.phone, "0901234567");
        assert_eq!(clean.email, "ann@example.com");
        assert_eq!(clean.address.as_deref(), Some("Hanoi"));
        assert!(clean.customer_code.is_empty());
    }
}

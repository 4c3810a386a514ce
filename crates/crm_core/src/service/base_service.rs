//! Generic entity service.
//!
//! # Responsibility
//! - Forward CRUD and table queries to any `Repository` implementation.
//! - Convert outcomes and errors into `ApiResponse` envelopes.
//!
//! # Invariants
//! - Never panics and never propagates `Err`; every path yields an envelope.

use crate::mapping::Entity;
use crate::repo::{Outcome, Repository, TableQuery};
use crate::service::response::{ApiResponse, Pagination};
use std::marker::PhantomData;

pub const OK_MESSAGE: &str = "OK";

/// Use-case wrapper around one entity repository.
pub struct BaseService<T: Entity, R: Repository<T>> {
    repo: R,
    default_page_size: u32,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, R: Repository<T>> BaseService<T, R> {
    pub fn new(repo: R, default_page_size: u32) -> Self {
        Self {
            repo,
            default_page_size,
            _entity: PhantomData,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Loads one record; a missing or deleted key is an error envelope.
    pub fn get_by_id(&self, key: &T::Key) -> ApiResponse<T> {
        match self.repo.get_by_key(key) {
            Ok(Some(mapped)) => ApiResponse::ok(mapped.record),
            Ok(None) => ApiResponse::error(not_found_message::<T>()),
            Err(err) => ApiResponse::error(err.to_string()),
        }
    }

    /// Inserts a batch; data carries the generated keys.
    pub fn insert(&self, records: &[T]) -> ApiResponse<Vec<T::Key>> {
        outcome_response::<T, _>(self.repo.insert(records))
    }

    pub fn update(&self, key: &T::Key, record: &T) -> ApiResponse<String> {
        outcome_response::<T, _>(self.repo.update(key, record).map(|()| OK_MESSAGE.to_string()))
    }

    /// Soft-deletes; data carries the affected-row count.
    pub fn delete(&self, keys: &[T::Key]) -> ApiResponse<usize> {
        outcome_response::<T, _>(self.repo.soft_delete(keys))
    }

    pub fn load_table(&self, query: &TableQuery) -> ApiResponse<Vec<T>> {
        match self.repo.query_table(query) {
            Ok(page) => {
                let meta = Pagination {
                    page: page.page_no,
                    page_size: page.page_size,
                    total: page.total,
                };
                ApiResponse::ok(page.into_records()).with_meta(meta)
            }
            Err(err) => ApiResponse::error(err.to_string()).with_meta(Pagination {
                page: query.effective_page_no(),
                page_size: query.effective_page_size(self.default_page_size),
                total: 0,
            }),
        }
    }
}

fn outcome_response<T: Entity, U>(outcome: Outcome<U>) -> ApiResponse<U> {
    match outcome {
        Outcome::Success(data) => ApiResponse::ok(data),
        Outcome::NotFound => ApiResponse::error(not_found_message::<T>()),
        Outcome::Failed(message) => ApiResponse::error(message),
    }
}

fn not_found_message<T: Entity>() -> String {
    format!("{} not found", T::TYPE_NAME.to_ascii_lowercase())
}

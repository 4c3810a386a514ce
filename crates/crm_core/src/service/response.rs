//! Transport envelope returned by services.

use serde::Serialize;

/// Paging metadata attached to listing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/// Service response: data on success, an error message on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Pagination>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            meta: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            meta: None,
            error: Some(message.into()),
        }
    }

    pub fn with_meta(mut self, meta: Pagination) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

//! Use-case services over the generic repository.
//!
//! # Responsibility
//! - Wrap repository results in the transport envelope (`ApiResponse`).
//! - Hold customer-specific rules: contact validation, code issuing, import.
//!
//! # Invariants
//! - Services never build SQL; they go through repository contracts.
//! - "Not found" surfaces as an error message with empty data.

pub mod base_service;
pub mod customer_service;
pub mod response;
pub mod validation;

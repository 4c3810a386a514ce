//! Customer entity.
//!
//! # Responsibility
//! - Define the customer record and its field-to-column table.
//!
//! # Invariants
//! - `customer_id` is generated by the repository on insert.
//! - `created_at` is store-managed and read-only.
//! - `customer_code` follows `KH{yyyyMM}{nnnnnn}`.

use crate::mapping::{CoercionError, ColumnValue, Entity, FieldDef};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CustomerId = Uuid;

const CUSTOMER_FIELDS: &[FieldDef] = &[
    FieldDef::primary_key("customer_id", "customer_id"),
    FieldDef::column("customer_code", "customer_code"),
    FieldDef::column("full_name", "full_name"),
    FieldDef::column("phone", "phone"),
    FieldDef::column("email", "email"),
    FieldDef::column("zalo", "Zalo"),
    FieldDef::column("address", "address"),
    FieldDef::column("tax_code", "tax_code"),
    FieldDef::column("customer_type", "customer_type"),
    FieldDef::column("shipping_address", "shipping_address"),
    FieldDef::column("billing_address", "billing_address"),
    FieldDef::column("last_purchase_date", "last_purchase_date"),
    FieldDef::column("purchased_items", "purchased_items"),
    FieldDef::column("last_purchased_item", "last_purchased_item"),
    FieldDef::column("avatar", "avatar"),
    FieldDef::column("avatar_path", "avatar_path"),
    FieldDef::read_only("created_at", "created_at"),
];

/// Customer record shared by reads, inserts and updates.
///
/// Missing JSON fields deserialize to their defaults, so insert payloads may
/// omit `customer_id` and `customer_code`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub customer_code: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub zalo: Option<String>,
    pub address: Option<String>,
    pub tax_code: Option<String>,
    pub customer_type: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub last_purchase_date: Option<NaiveDateTime>,
    pub purchased_items: Option<String>,
    pub last_purchased_item: Option<String>,
    pub avatar: Option<String>,
    pub avatar_path: Option<String>,
    /// Set by the store on insert.
    #[serde(skip_deserializing)]
    pub created_at: Option<NaiveDateTime>,
}

impl Customer {
    /// Builds an insert payload with the required contact fields.
    pub fn new(
        full_name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            phone: phone.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, customer_code: impl Into<String>) -> Self {
        self.customer_code = customer_code.into();
        self
    }
}

impl Entity for Customer {
    type Key = CustomerId;
    const TYPE_NAME: &'static str = "Customer";

    fn field_defs() -> &'static [FieldDef] {
        CUSTOMER_FIELDS
    }

    fn read_field(&self, field: &str) -> Option<Value> {
        let value = match field {
            "customer_id" => self.customer_id.to_sql_value(),
            "customer_code" => self.customer_code.to_sql_value(),
            "full_name" => self.full_name.to_sql_value(),
            "phone" => self.phone.to_sql_value(),
            "email" => self.email.to_sql_value(),
            "zalo" => self.zalo.to_sql_value(),
            "address" => self.address.to_sql_value(),
            "tax_code" => self.tax_code.to_sql_value(),
            "customer_type" => self.customer_type.to_sql_value(),
            "shipping_address" => self.shipping_address.to_sql_value(),
            "billing_address" => self.billing_address.to_sql_value(),
            "last_purchase_date" => self.last_purchase_date.to_sql_value(),
            "purchased_items" => self.purchased_items.to_sql_value(),
            "last_purchased_item" => self.last_purchased_item.to_sql_value(),
            "avatar" => self.avatar.to_sql_value(),
            "avatar_path" => self.avatar_path.to_sql_value(),
            "created_at" => self.created_at.to_sql_value(),
            _ => return None,
        };
        Some(value)
    }

    fn write_field(&mut self, field: &str, value: Value) -> Result<(), CoercionError> {
        match field {
            "customer_id" => self.customer_id = ColumnValue::from_sql_value(value)?,
            "customer_code" => self.customer_code = ColumnValue::from_sql_value(value)?,
            "full_name" => self.full_name = ColumnValue::from_sql_value(value)?,
            "phone" => self.phone = ColumnValue::from_sql_value(value)?,
            "email" => self.email = ColumnValue::from_sql_value(value)?,
            "zalo" => self.zalo = ColumnValue::from_sql_value(value)?,
            "address" => self.address = ColumnValue::from_sql_value(value)?,
            "tax_code" => self.tax_code = ColumnValue::from_sql_value(value)?,
            "customer_type" => self.customer_type = ColumnValue::from_sql_value(value)?,
            "shipping_address" => self.shipping_address = ColumnValue::from_sql_value(value)?,
            "billing_address" => self.billing_address = ColumnValue::from_sql_value(value)?,
            "last_purchase_date" => self.last_purchase_date = ColumnValue::from_sql_value(value)?,
            "purchased_items" => self.purchased_items = ColumnValue::from_sql_value(value)?,
            "last_purchased_item" => {
                self.last_purchased_item = ColumnValue::from_sql_value(value)?
            }
            "avatar" => self.avatar = ColumnValue::from_sql_value(value)?,
            "avatar_path" => self.avatar_path = ColumnValue::from_sql_value(value)?,
            "created_at" => self.created_at = ColumnValue::from_sql_value(value)?,
            other => return Err(CoercionError::UnknownField(other.to_string())),
        }
        Ok(())
    }
}

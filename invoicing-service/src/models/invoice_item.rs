//! Invoice item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Line on an invoice. `line_total` is computed at write time, never
/// recomputed on read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub invoice_item_id: i32,
    pub invoice_id: i32,
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub line_total: Decimal,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

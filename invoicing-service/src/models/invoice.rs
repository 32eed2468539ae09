//! Invoice model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Invoice header row. Monetary columns and the `status` text (`Active`,
/// `Void`, or `Paid`) are written by the stored procedures; the address
/// columns are a point-in-time snapshot of the customer's addresses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: i32,
    pub invoice_number: String,
    pub customer_id: i32,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub billing_address: Option<String>,
    pub billing_city: Option<String>,
    pub billing_state: Option<String>,
    pub billing_zip_code: Option<String>,
    pub billing_country: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_zip_code: Option<String>,
    pub shipping_country: Option<String>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Invoice row joined with the owning customer's display fields.
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceWithCustomer {
    #[sqlx(flatten)]
    pub invoice: Invoice,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

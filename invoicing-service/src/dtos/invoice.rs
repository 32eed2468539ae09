//! Invoice request and response payloads.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::models::{InvoiceItem, InvoiceWithCustomer};

fn default_invoice_date() -> NaiveDate {
    Utc::now().date_naive()
}

fn default_page_number() -> i32 {
    1
}

fn default_page_size() -> i32 {
    10
}

/// Body for creating or editing an invoice. Defaults mirror the lenient
/// binding of the previous API surface: absent numerics become zero and are
/// then rejected by validation, so clients always get the envelope with a
/// readable error list instead of a deserializer error.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    #[serde(default)]
    pub customer_id: i32,
    #[serde(default = "default_invoice_date")]
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    // Older clients send "items"; both names bind to the same list.
    #[serde(default, alias = "items")]
    pub invoice_items: Vec<InvoiceItemRequest>,
}

/// Line item inside an [`InvoiceRequest`]. Also `Serialize`: the
/// stored-procedure gateway forwards items as a jsonb array in this
/// exact camelCase shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceItemRequest {
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub unit: Option<String>,
}

/// Item shape accepted by the calculate-totals endpoint. Narrower than
/// [`InvoiceItemRequest`]: only the fields that money math needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculationItemRequest {
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
}

impl From<CalculationItemRequest> for InvoiceItemRequest {
    fn from(item: CalculationItemRequest) -> Self {
        InvoiceItemRequest {
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount_percentage: item.discount_percentage,
            discount_amount: item.discount_amount,
            ..Default::default()
        }
    }
}

/// Body for the calculate-totals endpoint.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculateTotalsRequest {
    pub items: Vec<CalculationItemRequest>,
    pub tax_rate: Decimal,
}

/// Query parameters for invoice search.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSearchQuery {
    pub customer_id: Option<i32>,
    pub status: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    #[serde(default = "default_page_number")]
    pub page_number: i32,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

/// Body for the test-email endpoint. Subject and body fall back to fixed
/// defaults when omitted.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TestEmailRequest {
    pub email: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Full invoice representation returned by the API, including the address
/// snapshot taken when the invoice was written.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub invoice_id: i32,
    pub invoice_number: String,
    pub customer_id: i32,
    pub customer_name: String,
    pub customer_email: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
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
    pub items: Vec<InvoiceItemResponse>,
}

impl InvoiceResponse {
    pub fn from_record(record: InvoiceWithCustomer, items: Vec<InvoiceItem>) -> Self {
        let invoice = record.invoice;
        Self {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            customer_id: invoice.customer_id,
            customer_name: record.customer_name,
            customer_email: record.customer_email,
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            subtotal: invoice.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: invoice.tax_amount,
            total_amount: invoice.total_amount,
            status: invoice.status,
            notes: invoice.notes,
            email_sent: invoice.email_sent,
            email_sent_at: invoice.email_sent_at,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
            billing_address: invoice.billing_address,
            billing_city: invoice.billing_city,
            billing_state: invoice.billing_state,
            billing_zip_code: invoice.billing_zip_code,
            billing_country: invoice.billing_country,
            shipping_address: invoice.shipping_address,
            shipping_city: invoice.shipping_city,
            shipping_state: invoice.shipping_state,
            shipping_zip_code: invoice.shipping_zip_code,
            shipping_country: invoice.shipping_country,
            items: items.into_iter().map(InvoiceItemResponse::from).collect(),
        }
    }
}

/// Line item inside an [`InvoiceResponse`].
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemResponse {
    pub invoice_item_id: i32,
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub line_total: Decimal,
    pub unit: Option<String>,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(item: InvoiceItem) -> Self {
        Self {
            invoice_item_id: item.invoice_item_id,
            product_name: item.product_name,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount_percentage: item.discount_percentage,
            discount_amount: item.discount_amount,
            line_total: item.line_total,
            unit: item.unit,
        }
    }
}

/// Row shape produced by the search procedure.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub invoice_id: i32,
    pub invoice_number: String,
    pub customer_id: i32,
    pub customer_name: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub status: String,
}

/// Result of the totals procedure.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_numeric_fields_bind_to_zero() {
        let request: InvoiceRequest = serde_json::from_value(serde_json::json!({
            "invoiceItems": [{"productName": "Widget"}]
        }))
        .unwrap();

        assert_eq!(request.customer_id, 0);
        assert_eq!(request.tax_rate, Decimal::ZERO);
        assert_eq!(request.invoice_items[0].quantity, Decimal::ZERO);
        assert_eq!(request.invoice_items[0].product_name, "Widget");
    }

    #[test]
    fn invoice_date_defaults_to_today() {
        let request: InvoiceRequest = serde_json::from_value(serde_json::json!({
            "customerId": 1
        }))
        .unwrap();
        assert_eq!(request.invoice_date, Utc::now().date_naive());
    }

    #[test]
    fn decimal_fields_accept_numbers_and_strings() {
        let request: InvoiceItemRequest = serde_json::from_value(serde_json::json!({
            "productName": "Widget",
            "quantity": 2,
            "unitPrice": "19.99"
        }))
        .unwrap();
        assert_eq!(request.quantity, Decimal::from(2));
        assert_eq!(request.unit_price, Decimal::new(1999, 2));
    }

    #[test]
    fn search_query_defaults_pagination() {
        let query: InvoiceSearchQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.page_number, 1);
        assert_eq!(query.page_size, 10);
        assert!(query.customer_id.is_none());
    }

    #[test]
    fn legacy_items_key_still_binds() {
        let request: InvoiceRequest = serde_json::from_value(serde_json::json!({
            "customerId": 1,
            "items": [{"productName": "Widget", "quantity": 1, "unitPrice": 5}]
        }))
        .unwrap();
        assert_eq!(request.invoice_items.len(), 1);
    }

    #[test]
    fn response_items_serialize_under_items_key() {
        let response = InvoiceItemResponse {
            invoice_item_id: 1,
            product_name: "Widget".to_string(),
            description: None,
            quantity: Decimal::ONE,
            unit_price: Decimal::new(500, 2),
            discount_percentage: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            line_total: Decimal::new(500, 2),
            unit: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["invoiceItemId"], 1);
        assert_eq!(value["lineTotal"], "5.00");
    }
}

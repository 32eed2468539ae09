//! Stored-procedure gateway.
//!
//! All invoice writes, the paged search, and the totals preview run inside
//! database routines (`sp_add_invoice`, `sp_edit_invoice`, `sp_void_invoice`,
//! `sp_search_invoice`, `sp_calculate_totals`). The gateway acquires a
//! connection with retry, then executes the call exactly once: retrying a
//! statement that may already have committed could duplicate an invoice.

use crate::dtos::{InvoiceItemRequest, InvoiceRequest, InvoiceSearchQuery, InvoiceSummary, InvoiceTotals};
use crate::services::database::is_transient_connect_error;
use crate::services::metrics::{DB_QUERY_DURATION, INVOICE_OPERATIONS_TOTAL};
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_async, RetryConfig};
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, instrument};

/// Routines signal business failures with RAISE EXCEPTION, which arrives as
/// SQLSTATE P0001. Those messages are written for clients and surface as 400;
/// everything else is an infrastructure fault.
fn map_procedure_error(routine: &'static str, e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("P0001") => {
            AppError::BadRequest(anyhow::anyhow!("{}", db_err.message()))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to execute {}: {}", routine, e)),
    }
}

/// Serialize request items into the jsonb array shape the routines expect.
fn items_to_json(items: &[InvoiceItemRequest]) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(items)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode items: {}", e)))
}

#[derive(FromRow)]
struct SearchRow {
    #[sqlx(flatten)]
    summary: InvoiceSummary,
    total_count: i64,
}

/// Thin typed wrapper around the invoicing database routines.
#[derive(Clone)]
pub struct ProcedureGateway {
    pool: PgPool,
}

impl ProcedureGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check out a connection, retrying transient pool and network failures.
    /// Statement execution happens after this and is never retried.
    async fn acquire(&self) -> Result<PoolConnection<Postgres>, AppError> {
        let retry = RetryConfig::default();
        retry_async(
            &retry,
            "acquire_connection",
            is_transient_connect_error,
            || self.pool.acquire(),
        )
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })
    }

    /// Create an invoice with its items and computed totals. Returns the new
    /// invoice id.
    #[instrument(skip(self, request), fields(customer_id = request.customer_id))]
    pub async fn add_invoice(&self, request: &InvoiceRequest) -> Result<i32, AppError> {
        let items = items_to_json(&request.invoice_items)?;
        let mut conn = self.acquire().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["sp_add_invoice"])
            .start_timer();

        let invoice_id: i32 =
            sqlx::query_scalar("SELECT sp_add_invoice($1, $2, $3, $4, $5, $6::jsonb)")
                .bind(request.customer_id)
                .bind(request.invoice_date)
                .bind(request.due_date)
                .bind(request.tax_rate)
                .bind(&request.notes)
                .bind(items)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_procedure_error("sp_add_invoice", e))?;

        timer.observe_duration();
        INVOICE_OPERATIONS_TOTAL.with_label_values(&["created"]).inc();
        info!(invoice_id, "Invoice created");
        Ok(invoice_id)
    }

    /// Replace an invoice's fields and items and recompute totals. Returns
    /// false when the invoice does not exist or is voided.
    #[instrument(skip(self, request))]
    pub async fn edit_invoice(
        &self,
        invoice_id: i32,
        request: &InvoiceRequest,
    ) -> Result<bool, AppError> {
        let items = items_to_json(&request.invoice_items)?;
        let mut conn = self.acquire().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["sp_edit_invoice"])
            .start_timer();

        let updated: bool =
            sqlx::query_scalar("SELECT sp_edit_invoice($1, $2, $3, $4, $5, $6, $7::jsonb)")
                .bind(invoice_id)
                .bind(request.customer_id)
                .bind(request.invoice_date)
                .bind(request.due_date)
                .bind(request.tax_rate)
                .bind(&request.notes)
                .bind(items)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_procedure_error("sp_edit_invoice", e))?;

        timer.observe_duration();
        if updated {
            INVOICE_OPERATIONS_TOTAL.with_label_values(&["updated"]).inc();
            info!(invoice_id, "Invoice updated");
        }
        Ok(updated)
    }

    /// Mark an invoice Void. Returns false when the invoice does not exist
    /// or is already voided.
    #[instrument(skip(self))]
    pub async fn void_invoice(&self, invoice_id: i32) -> Result<bool, AppError> {
        let mut conn = self.acquire().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["sp_void_invoice"])
            .start_timer();

        let voided: bool = sqlx::query_scalar("SELECT sp_void_invoice($1)")
            .bind(invoice_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_procedure_error("sp_void_invoice", e))?;

        timer.observe_duration();
        if voided {
            INVOICE_OPERATIONS_TOTAL.with_label_values(&["voided"]).inc();
            info!(invoice_id, "Invoice voided");
        }
        Ok(voided)
    }

    /// Run the paged search. Every row carries the total match count; an
    /// empty page means zero matches.
    #[instrument(skip(self, query), fields(page = query.page_number, page_size = query.page_size))]
    pub async fn search_invoices(
        &self,
        query: &InvoiceSearchQuery,
    ) -> Result<(Vec<InvoiceSummary>, i64), AppError> {
        let mut conn = self.acquire().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["sp_search_invoice"])
            .start_timer();

        let rows = sqlx::query_as::<_, SearchRow>(
            "SELECT * FROM sp_search_invoice($1, $2, $3, $4, $5, $6)",
        )
        .bind(query.customer_id)
        .bind(&query.status)
        .bind(query.from_date)
        .bind(query.to_date)
        .bind(query.page_number)
        .bind(query.page_size)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_procedure_error("sp_search_invoice", e))?;

        timer.observe_duration();

        let total = rows.first().map(|row| row.total_count).unwrap_or(0);
        let summaries = rows.into_iter().map(|row| row.summary).collect();
        Ok((summaries, total))
    }

    /// Compute subtotal, tax, and grand total for a prospective item list
    /// without persisting anything.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn calculate_totals(
        &self,
        items: &[InvoiceItemRequest],
        tax_rate: Decimal,
    ) -> Result<InvoiceTotals, AppError> {
        let items = items_to_json(items)?;
        let mut conn = self.acquire().await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["sp_calculate_totals"])
            .start_timer();

        let totals = sqlx::query_as::<_, InvoiceTotals>(
            "SELECT * FROM sp_calculate_totals($1::jsonb, $2)",
        )
        .bind(items)
        .bind(tax_rate)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_procedure_error("sp_calculate_totals", e))?;

        timer.observe_duration();
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn items_serialize_with_camel_case_keys() {
        let items = vec![InvoiceItemRequest {
            product_name: "Widget".to_string(),
            description: Some("Blue".to_string()),
            quantity: dec("2"),
            unit_price: dec("10.50"),
            discount_percentage: dec("0"),
            discount_amount: dec("0"),
            unit: Some("pcs".to_string()),
        }];

        let json = items_to_json(&items).unwrap();
        let first = &json[0];
        assert_eq!(first["productName"], "Widget");
        assert_eq!(first["unitPrice"], "10.50");
        assert_eq!(first["discountPercentage"], "0");
        assert!(first.get("product_name").is_none());
    }

    #[test]
    fn non_database_errors_map_to_infrastructure_failures() {
        let err = map_procedure_error("sp_add_invoice", sqlx::Error::RowNotFound);
        match err {
            AppError::DatabaseError(inner) => {
                assert!(inner.to_string().contains("sp_add_invoice"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

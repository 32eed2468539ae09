use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use tracing::info;

use crate::dtos::{
    ApiResponse, CalculateTotalsRequest, InvoiceItemRequest, InvoiceRequest, InvoiceResponse,
    InvoiceSearchQuery, InvoiceTotals, PagedResult, TestEmailRequest,
};
use crate::models::{InvoiceItem, InvoiceWithCustomer};
use crate::services::calculation;
use crate::services::email::{DEFAULT_TEST_BODY, DEFAULT_TEST_SUBJECT};
use crate::startup::AppState;
use service_core::error::AppError;

/// Re-read an invoice that a routine just wrote. Absence at this point is
/// an inconsistency, not a caller mistake.
async fn load_invoice(state: &AppState, invoice_id: i32) -> Result<InvoiceWithCustomer, AppError> {
    state.db.get_invoice(invoice_id).await?.ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Invoice {} missing after write",
            invoice_id
        ))
    })
}

/// Create an invoice
#[utoipa::path(
    post,
    path = "/api/invoices",
    request_body = InvoiceRequest,
    responses(
        (status = 200, description = "Invoice created successfully"),
        (status = 400, description = "Validation failed or customer missing"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state, request), fields(customer_id = request.customer_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, AppError> {
    let errors = calculation::validate_invoice(&request);
    if !errors.is_empty() {
        return Err(AppError::ValidationError(errors));
    }

    let result = async {
        if !state.db.customer_exists(request.customer_id).await? {
            return Err(AppError::BadRequest(anyhow::anyhow!("Customer not found")));
        }

        let invoice_id = state.procedures.add_invoice(&request).await?;

        let mut record = load_invoice(&state, invoice_id).await?;
        let items = state.db.get_invoice_items(invoice_id).await?;

        if state.mailer.send_invoice_email(&record, &items).await {
            state.db.mark_invoice_email_sent(invoice_id).await?;
            record = load_invoice(&state, invoice_id).await?;
        }

        info!(
            invoice_number = %record.invoice.invoice_number,
            customer_id = request.customer_id,
            "Invoice created successfully"
        );

        Ok(Json(ApiResponse::success(
            "Invoice created successfully",
            InvoiceResponse::from_record(record, items),
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while creating the invoice")
    })
}

/// Update an invoice
#[utoipa::path(
    put,
    path = "/api/invoices/{id}",
    params(("id" = i32, Path, description = "Invoice id")),
    request_body = InvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated successfully"),
        (status = 400, description = "Validation failed, invoice missing, or invoice voided"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state, request), fields(invoice_id = %invoice_id))]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, AppError> {
    let errors = calculation::validate_invoice(&request);
    if !errors.is_empty() {
        return Err(AppError::ValidationError(errors));
    }

    let result = async {
        let updated = state.procedures.edit_invoice(invoice_id, &request).await?;
        if !updated {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice not found or cannot be updated (possibly voided)"
            )));
        }

        let record = load_invoice(&state, invoice_id).await?;
        let items = state.db.get_invoice_items(invoice_id).await?;

        info!(invoice_number = %record.invoice.invoice_number, "Invoice updated successfully");

        Ok(Json(ApiResponse::success(
            "Invoice updated successfully",
            InvoiceResponse::from_record(record, items),
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while updating the invoice")
    })
}

/// Void an invoice
#[utoipa::path(
    put,
    path = "/api/invoices/{id}/void",
    params(("id" = i32, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice voided successfully"),
        (status = 400, description = "Invoice missing or already voided"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state), fields(invoice_id = %invoice_id))]
pub async fn void_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, AppError> {
    let result = async {
        let voided = state.procedures.void_invoice(invoice_id).await?;
        if !voided {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice not found or already voided"
            )));
        }

        let record = load_invoice(&state, invoice_id).await?;
        let items = state.db.get_invoice_items(invoice_id).await?;

        info!(invoice_number = %record.invoice.invoice_number, "Invoice voided successfully");

        Ok(Json(ApiResponse::success(
            "Invoice voided successfully",
            InvoiceResponse::from_record(record, items),
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while voiding the invoice")
    })
}

/// Search invoices with paging
#[utoipa::path(
    get,
    path = "/api/invoices/search",
    params(InvoiceSearchQuery),
    responses(
        (status = 200, description = "Invoices retrieved successfully"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state, query))]
pub async fn search_invoices(
    State(state): State<AppState>,
    Query(mut query): Query<InvoiceSearchQuery>,
) -> Result<Json<ApiResponse<PagedResult<InvoiceResponse>>>, AppError> {
    query.page_number = query.page_number.max(1);
    query.page_size = query.page_size.clamp(1, 100);

    let result = async {
        let (summaries, total_records) = state.procedures.search_invoices(&query).await?;

        let mut responses = Vec::with_capacity(summaries.len());
        if !summaries.is_empty() {
            let ids: Vec<i32> = summaries.iter().map(|s| s.invoice_id).collect();
            let records = state.db.get_invoices_by_ids(&ids).await?;
            let all_items = state.db.get_invoice_items_for(&ids).await?;

            let mut records_by_id: HashMap<i32, InvoiceWithCustomer> = records
                .into_iter()
                .map(|record| (record.invoice.invoice_id, record))
                .collect();
            let mut items_by_invoice: HashMap<i32, Vec<InvoiceItem>> = HashMap::new();
            for item in all_items {
                items_by_invoice.entry(item.invoice_id).or_default().push(item);
            }

            // The routine decides the ordering; the bulk reads do not.
            for summary in &summaries {
                if let Some(record) = records_by_id.remove(&summary.invoice_id) {
                    let items = items_by_invoice.remove(&summary.invoice_id).unwrap_or_default();
                    responses.push(InvoiceResponse::from_record(record, items));
                }
            }
        }

        let page = PagedResult::new(responses, total_records, query.page_number, query.page_size);

        Ok(Json(ApiResponse::success(
            "Invoices retrieved successfully",
            page,
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while searching invoices")
    })
}

/// Fetch one invoice by id
#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    params(("id" = i32, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice retrieved successfully"),
        (status = 404, description = "Invoice not found"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state))]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, AppError> {
    let result = async {
        let record = state
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let items = state.db.get_invoice_items(invoice_id).await?;

        Ok(Json(ApiResponse::success(
            "Invoice retrieved successfully",
            InvoiceResponse::from_record(record, items),
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while retrieving the invoice")
    })
}

/// Resend the invoice email
#[utoipa::path(
    post,
    path = "/api/invoices/{id}/resend-email",
    params(("id" = i32, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice email sent successfully"),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Email delivery failed"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state), fields(invoice_id = %invoice_id))]
pub async fn resend_invoice_email(
    State(state): State<AppState>,
    Path(invoice_id): Path<i32>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let result = async {
        let record = state
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let items = state.db.get_invoice_items(invoice_id).await?;

        if state.mailer.send_invoice_email(&record, &items).await {
            state.db.mark_invoice_email_sent(invoice_id).await?;
            Ok(Json(ApiResponse::success(
                "Invoice email sent successfully",
                serde_json::Value::Null,
            )))
        } else {
            Err(AppError::EmailError(
                "Failed to send invoice email".to_string(),
            ))
        }
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while sending the invoice email")
    })
}

/// Preview invoice totals without saving
#[utoipa::path(
    post,
    path = "/api/invoices/calculate-totals",
    request_body = CalculateTotalsRequest,
    responses(
        (status = 200, description = "Totals calculated successfully", body = InvoiceTotals),
        (status = 400, description = "Empty or invalid item list"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state, request), fields(item_count = request.items.len()))]
pub async fn calculate_totals(
    State(state): State<AppState>,
    Json(request): Json<CalculateTotalsRequest>,
) -> Result<Response, AppError> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At least one item is required"
        )));
    }

    let mut errors = Vec::new();
    for item in &request.items {
        let converted = InvoiceItemRequest::from(item.clone());
        errors.extend(calculation::validate_invoice_item(&converted));
    }
    if !errors.is_empty() {
        let body = ApiResponse::<serde_json::Value>::error_with_details("Invalid item data", errors);
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let items: Vec<InvoiceItemRequest> =
        request.items.iter().cloned().map(Into::into).collect();

    let totals = state
        .procedures
        .calculate_totals(&items, request.tax_rate)
        .await
        .map_err(|err| err.with_operation("An error occurred while calculating totals"))?;

    Ok(Json(ApiResponse::success("Totals calculated successfully", totals)).into_response())
}

/// Send a test email
#[utoipa::path(
    post,
    path = "/api/invoices/test-email",
    request_body = TestEmailRequest,
    responses(
        (status = 200, description = "Send attempted; success flag reports the outcome"),
        (status = 400, description = "Email address missing"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Invoices"
)]
#[tracing::instrument(skip(state, request))]
pub async fn send_test_email(
    State(state): State<AppState>,
    Json(request): Json<TestEmailRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let email = match request.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Email address is required"
            )))
        }
    };

    let subject = request
        .subject
        .unwrap_or_else(|| DEFAULT_TEST_SUBJECT.to_string());
    let body = request
        .body
        .unwrap_or_else(|| DEFAULT_TEST_BODY.to_string());

    let sent = state.mailer.send_test_email(&email, &subject, &body).await;

    let data = serde_json::json!({
        "email": email,
        "subject": subject,
        "emailMode": state.mailer.mode(),
    });

    // Always 200: the envelope's success flag carries the outcome.
    let response = if sent {
        ApiResponse::success("Test email sent successfully", data)
    } else {
        ApiResponse {
            success: false,
            message: "Failed to send test email".to_string(),
            data: Some(data),
            errors: Vec::new(),
        }
    };

    Ok(Json(response))
}

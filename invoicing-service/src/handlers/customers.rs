use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::dtos::{ApiResponse, CustomerRequest};
use crate::models::Customer;
use crate::startup::AppState;
use service_core::error::AppError;

/// Create a customer
#[utoipa::path(
    post,
    path = "/api/customers",
    request_body = CustomerRequest,
    responses(
        (status = 200, description = "Customer created successfully"),
        (status = 400, description = "Validation failed or email already in use"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Customers"
)]
#[tracing::instrument(skip(state, request), fields(email = %request.email))]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<CustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, AppError> {
    request.validate()?;

    let result = async {
        if state
            .db
            .customer_email_exists(&request.email, None)
            .await?
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A customer with this email already exists"
            )));
        }

        let customer = state.db.insert_customer(&request).await?;
        Ok(Json(ApiResponse::success(
            "Customer created successfully",
            customer,
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while creating the customer")
    })
}

/// List all customers
#[utoipa::path(
    get,
    path = "/api/customers",
    responses(
        (status = 200, description = "Customers retrieved successfully"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Customers"
)]
#[tracing::instrument(skip(state))]
pub async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Customer>>>, AppError> {
    let customers = state
        .db
        .list_customers()
        .await
        .map_err(|err| err.with_operation("An error occurred while retrieving customers"))?;

    Ok(Json(ApiResponse::success(
        "Customers retrieved successfully",
        customers,
    )))
}

/// Fetch one customer by id
#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(("id" = i32, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer retrieved successfully"),
        (status = 404, description = "Customer not found"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Customers"
)]
#[tracing::instrument(skip(state))]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i32>,
) -> Result<Json<ApiResponse<Customer>>, AppError> {
    let customer = state
        .db
        .get_customer(customer_id)
        .await
        .map_err(|err| err.with_operation("An error occurred while retrieving the customer"))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

    Ok(Json(ApiResponse::success(
        "Customer retrieved successfully",
        customer,
    )))
}

/// Update a customer
#[utoipa::path(
    put,
    path = "/api/customers/{id}",
    params(("id" = i32, Path, description = "Customer id")),
    request_body = CustomerRequest,
    responses(
        (status = 200, description = "Customer updated successfully"),
        (status = 400, description = "Validation failed or email already in use"),
        (status = 404, description = "Customer not found"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "Customers"
)]
#[tracing::instrument(skip(state, request), fields(customer_id = %customer_id))]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i32>,
    Json(request): Json<CustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, AppError> {
    request.validate()?;

    let result = async {
        let existing = state
            .db
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

        // Only re-check uniqueness when the email actually changes.
        if !existing.email.eq_ignore_ascii_case(&request.email)
            && state
                .db
                .customer_email_exists(&request.email, Some(customer_id))
                .await?
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A customer with this email already exists"
            )));
        }

        let updated = state
            .db
            .update_customer(customer_id, &request)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

        Ok(Json(ApiResponse::success(
            "Customer updated successfully",
            updated,
        )))
    }
    .await;

    result.map_err(|err: AppError| {
        err.with_operation("An error occurred while updating the customer")
    })
}

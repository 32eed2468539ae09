pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::service_info,
        handlers::health::health_check,
        handlers::health::metrics_handler,
        handlers::customers::create_customer,
        handlers::customers::list_customers,
        handlers::customers::get_customer,
        handlers::customers::update_customer,
        handlers::invoices::create_invoice,
        handlers::invoices::update_invoice,
        handlers::invoices::void_invoice,
        handlers::invoices::search_invoices,
        handlers::invoices::get_invoice,
        handlers::invoices::resend_invoice_email,
        handlers::invoices::calculate_totals,
        handlers::invoices::send_test_email,
    ),
    components(
        schemas(
            dtos::CustomerRequest,
            dtos::InvoiceRequest,
            dtos::InvoiceItemRequest,
            dtos::CalculationItemRequest,
            dtos::CalculateTotalsRequest,
            dtos::TestEmailRequest,
            dtos::InvoiceResponse,
            dtos::InvoiceItemResponse,
            dtos::InvoiceSummary,
            dtos::InvoiceTotals,
            models::Customer,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Customers", description = "Customer management"),
        (name = "Invoices", description = "Invoice lifecycle, search, and email delivery"),
        (name = "Platform", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::middleware::API_KEY_HEADER,
                ))),
            );
        }
    }
}

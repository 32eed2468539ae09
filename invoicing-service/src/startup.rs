//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::middleware::{require_api_key, track_http_metrics, ApiKeySettings};
use crate::services::{Database, Mailer, ProcedureGateway, SimulatedMailer, SmtpMailer};
use crate::ApiDoc;
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub procedures: ProcedureGateway,
    pub mailer: Arc<dyn Mailer>,
}

/// Assembles the full router. The API-key layer wraps every route; the
/// exemptions for `/`, `/health`, and the Swagger paths live inside the
/// middleware itself.
pub fn build_router(state: AppState, api_keys: Vec<String>) -> Router {
    let api_key_settings = ApiKeySettings::new(api_keys);

    Router::new()
        .route("/", get(handlers::health::service_info))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .merge(SwaggerUi::new("/swagger").url("/swagger/openapi.json", ApiDoc::openapi()))
        .route(
            "/api/customers",
            post(handlers::customers::create_customer).get(handlers::customers::list_customers),
        )
        .route(
            "/api/customers/:id",
            get(handlers::customers::get_customer).put(handlers::customers::update_customer),
        )
        .route("/api/invoices", post(handlers::invoices::create_invoice))
        .route(
            "/api/invoices/search",
            get(handlers::invoices::search_invoices),
        )
        .route(
            "/api/invoices/calculate-totals",
            post(handlers::invoices::calculate_totals),
        )
        .route(
            "/api/invoices/test-email",
            post(handlers::invoices::send_test_email),
        )
        .route(
            "/api/invoices/:id",
            get(handlers::invoices::get_invoice).put(handlers::invoices::update_invoice),
        )
        .route(
            "/api/invoices/:id/void",
            put(handlers::invoices::void_invoice),
        )
        .route(
            "/api/invoices/:id/resend-email",
            post(handlers::invoices::resend_invoice_email),
        )
        .with_state(state)
        .layer(from_fn_with_state(api_key_settings, require_api_key))
        .layer(from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    api_keys: Vec<String>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let db = Database::connect(&config.database).await.map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;

        let procedures = ProcedureGateway::new(db.pool().clone());

        let mailer: Arc<dyn Mailer> = if config.email.enabled {
            match SmtpMailer::new(config.email.clone()) {
                Ok(mailer) => {
                    tracing::info!(host = %config.email.host, "SMTP mailer initialized");
                    Arc::new(mailer)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP mailer: {}. Using simulation.", e);
                    Arc::new(SimulatedMailer)
                }
            }
        } else {
            tracing::info!("Email sending disabled, running in simulation mode");
            Arc::new(SimulatedMailer)
        };

        let state = AppState {
            db,
            procedures,
            mailer,
        };

        // Bind listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "invoicing-service listening");

        Ok(Self {
            port,
            listener,
            state,
            api_keys: config.api.keys,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = build_router(self.state, self.api_keys);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

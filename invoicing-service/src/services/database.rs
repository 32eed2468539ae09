//! Database service for invoicing-service.
//!
//! Direct SQL lives here: customer CRUD, invoice re-reads, and the
//! email-sent flag. Invoice writes go through the stored-procedure gateway
//! instead (`services::procedures`), which shares this pool.

use crate::config::DatabaseConfig;
use crate::dtos::CustomerRequest;
use crate::models::{Customer, InvoiceItem, InvoiceWithCustomer};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use service_core::retry::{retry_async, RetryConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Connection failures worth retrying: the server or network being
/// temporarily unavailable. Auth and protocol errors are permanent.
pub(crate) fn is_transient_connect_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => true,
        sqlx::Error::Database(db_err) => {
            // 57P03: the server is still starting up
            db_err.code().as_deref() == Some("57P03")
        }
        _ => false,
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the connection pool, retrying transient failures with
    /// exponential backoff (three attempts, one second initial delay).
    #[instrument(skip(config), fields(service = "invoicing-service"))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let retry = RetryConfig::default();
        let pool = retry_async(
            &retry,
            "database_connect",
            is_transient_connect_error,
            || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(30))
                    .idle_timeout(Duration::from_secs(600))
                    .connect(&config.url)
            },
        )
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Build the pool without touching the network. Used by tests that
    /// exercise routing and validation paths only; the short acquire
    /// timeout makes paths that do reach the pool fail fast.
    pub fn connect_lazy(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations. The stored procedures are provisioned
    /// separately by the DBA and are deliberately not part of these
    /// migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Customer Operations
    // -------------------------------------------------------------------------

    /// Insert a new customer.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn insert_customer(&self, input: &CustomerRequest) -> Result<Customer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (
                first_name, last_name, email, phone,
                billing_address, city, state, zip_code, country,
                shipping_address, shipping_city, shipping_state,
                shipping_zip_code, shipping_country
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.billing_address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip_code)
        .bind(&input.country)
        .bind(&input.shipping_address)
        .bind(&input.shipping_city)
        .bind(&input.shipping_state)
        .bind(&input.shipping_zip_code)
        .bind(&input.shipping_country)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A customer with this email already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert customer: {}", e)),
        })?;

        timer.observe_duration();
        info!(customer_id = customer.customer_id, "Customer created");
        Ok(customer)
    }

    /// List all customers ordered by last name, then first name.
    #[instrument(skip(self))]
    pub async fn list_customers(&self) -> Result<Vec<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers ORDER BY last_name, first_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list customers: {}", e)))?;

        timer.observe_duration();
        Ok(customers)
    }

    /// Fetch a customer by id.
    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: i32) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let customer =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e))
                })?;

        timer.observe_duration();
        Ok(customer)
    }

    /// Update a customer in place, stamping `updated_at`. Returns `None`
    /// when the id does not exist.
    #[instrument(skip(self, input))]
    pub async fn update_customer(
        &self,
        customer_id: i32,
        input: &CustomerRequest,
    ) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET
                first_name = $1, last_name = $2, email = $3, phone = $4,
                billing_address = $5, city = $6, state = $7, zip_code = $8,
                country = $9, shipping_address = $10, shipping_city = $11,
                shipping_state = $12, shipping_zip_code = $13,
                shipping_country = $14, updated_at = NOW()
            WHERE customer_id = $15
            RETURNING *
            "#,
        )
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.billing_address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip_code)
        .bind(&input.country)
        .bind(&input.shipping_address)
        .bind(&input.shipping_city)
        .bind(&input.shipping_state)
        .bind(&input.shipping_zip_code)
        .bind(&input.shipping_country)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A customer with this email already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update customer: {}", e)),
        })?;

        timer.observe_duration();
        if customer.is_some() {
            info!(customer_id, "Customer updated");
        }
        Ok(customer)
    }

    /// Whether a customer with this id exists.
    #[instrument(skip(self))]
    pub async fn customer_exists(&self, customer_id: i32) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["customer_exists"])
            .start_timer();

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE customer_id = $1)")
                .bind(customer_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to check customer: {}", e))
                })?;

        timer.observe_duration();
        Ok(exists)
    }

    /// Whether another customer already uses this email. The comparison is
    /// case-insensitive, matching the unique index.
    #[instrument(skip(self, email))]
    pub async fn customer_email_exists(
        &self,
        email: &str,
        exclude_customer_id: Option<i32>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["customer_email_exists"])
            .start_timer();

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM customers
                WHERE LOWER(email) = LOWER($1)
                  AND ($2::int IS NULL OR customer_id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check email: {}", e)))?;

        timer.observe_duration();
        Ok(exists)
    }

    // -------------------------------------------------------------------------
    // Invoice Reads
    // -------------------------------------------------------------------------

    /// Fetch an invoice joined with its customer's display fields.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        invoice_id: i32,
    ) -> Result<Option<InvoiceWithCustomer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, InvoiceWithCustomer>(
            r#"
            SELECT i.*,
                   c.first_name || ' ' || c.last_name AS customer_name,
                   c.email AS customer_email,
                   c.phone AS customer_phone
            FROM invoices i
            JOIN customers c ON c.customer_id = i.customer_id
            WHERE i.invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();
        Ok(invoice)
    }

    /// Fetch several invoices at once. Row order is unspecified; callers
    /// that care about order re-sort by id.
    #[instrument(skip(self, invoice_ids), fields(count = invoice_ids.len()))]
    pub async fn get_invoices_by_ids(
        &self,
        invoice_ids: &[i32],
    ) -> Result<Vec<InvoiceWithCustomer>, AppError> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoices_by_ids"])
            .start_timer();

        let invoices = sqlx::query_as::<_, InvoiceWithCustomer>(
            r#"
            SELECT i.*,
                   c.first_name || ' ' || c.last_name AS customer_name,
                   c.email AS customer_email,
                   c.phone AS customer_phone
            FROM invoices i
            JOIN customers c ON c.customer_id = i.customer_id
            WHERE i.invoice_id = ANY($1)
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoices: {}", e)))?;

        timer.observe_duration();
        Ok(invoices)
    }

    /// Fetch the items of one invoice in insertion order.
    #[instrument(skip(self))]
    pub async fn get_invoice_items(&self, invoice_id: i32) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY invoice_item_id",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
        })?;

        timer.observe_duration();
        Ok(items)
    }

    /// Fetch the items of several invoices in one round trip.
    #[instrument(skip(self, invoice_ids), fields(count = invoice_ids.len()))]
    pub async fn get_invoice_items_for(
        &self,
        invoice_ids: &[i32],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items_for"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT * FROM invoice_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, invoice_item_id
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
        })?;

        timer.observe_duration();
        Ok(items)
    }

    /// Record that the invoice email went out.
    #[instrument(skip(self))]
    pub async fn mark_invoice_email_sent(&self, invoice_id: i32) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_email_sent"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoices
            SET email_sent = TRUE, email_sent_at = NOW(), updated_at = NOW()
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark email sent: {}", e))
        })?;

        timer.observe_duration();
        info!(invoice_id, "Invoice email flag updated");
        Ok(())
    }
}

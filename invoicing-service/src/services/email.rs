//! Invoice email delivery.
//!
//! `Mailer` reports plain success or failure. Delivery problems are logged
//! and counted but never turned into request errors: an invoice that saved
//! correctly is not rolled back because SMTP was down.

use crate::config::EmailConfig;
use crate::models::{InvoiceItem, InvoiceWithCustomer};
use crate::services::metrics::EMAILS_TOTAL;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_TEST_SUBJECT: &str = "Test Email from Invoicing System";
pub const DEFAULT_TEST_BODY: &str =
    "This is a test email to verify the email functionality is working correctly.";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invoice_email(
        &self,
        invoice: &InvoiceWithCustomer,
        items: &[InvoiceItem],
    ) -> bool;

    async fn send_test_email(&self, to: &str, subject: &str, body: &str) -> bool;

    /// Label reported by the test-email endpoint.
    fn mode(&self) -> &'static str;
}

/// Real SMTP delivery through lettre.
pub struct SmtpMailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Result<Self, AppError> {
        let mut builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to create SMTP relay: {}", e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port);

        // Some relays (local Mailhog, internal smarthosts) take no auth.
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            config,
            transport: builder.build(),
        })
    }

    async fn deliver(
        &self,
        to: Mailbox,
        subject: &str,
        text: String,
        html: String,
    ) -> anyhow::Result<()> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .map_err(|e| anyhow::anyhow!("Failed to build message: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send email: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invoice_email(
        &self,
        invoice: &InvoiceWithCustomer,
        items: &[InvoiceItem],
    ) -> bool {
        let number = invoice.invoice.invoice_number.clone();
        let subject = format!("Invoice #{} - {}", number, invoice.customer_name);
        let text = format!(
            "Please find your invoice #{} attached. Total Amount: ${:.2}",
            number, invoice.invoice.total_amount
        );
        let html = render_invoice_html(invoice, items);

        info!(to = %invoice.customer_email, invoice_number = %number, "Sending invoice email");

        let result = async {
            let address: Address = invoice
                .customer_email
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid recipient address: {}", e))?;
            let to = Mailbox::new(Some(invoice.customer_name.clone()), address);
            self.deliver(to, &subject, text, html).await
        }
        .await;

        match result {
            Ok(()) => {
                EMAILS_TOTAL.with_label_values(&["smtp", "sent"]).inc();
                info!(to = %invoice.customer_email, invoice_number = %number, "Invoice email sent");
                true
            }
            Err(e) => {
                EMAILS_TOTAL.with_label_values(&["smtp", "failed"]).inc();
                error!(
                    error = %e,
                    to = %invoice.customer_email,
                    invoice_number = %number,
                    "Failed to send invoice email"
                );
                false
            }
        }
    }

    async fn send_test_email(&self, to: &str, subject: &str, body: &str) -> bool {
        info!(to = %to, "Sending test email");

        let html = format!(
            "<html><body><p>{}</p><p>This is a test email from the Invoicing System.</p></body></html>",
            body
        );

        let result = async {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid recipient address: {}", e))?;
            self.deliver(mailbox, subject, body.to_string(), html).await
        }
        .await;

        match result {
            Ok(()) => {
                EMAILS_TOTAL.with_label_values(&["smtp", "sent"]).inc();
                info!(to = %to, "Test email sent");
                true
            }
            Err(e) => {
                EMAILS_TOTAL.with_label_values(&["smtp", "failed"]).inc();
                error!(error = %e, to = %to, "Failed to send test email");
                false
            }
        }
    }

    fn mode(&self) -> &'static str {
        "SMTP"
    }
}

/// Development mailer. Logs what would be sent and pretends it worked.
pub struct SimulatedMailer;

#[async_trait]
impl Mailer for SimulatedMailer {
    async fn send_invoice_email(
        &self,
        invoice: &InvoiceWithCustomer,
        _items: &[InvoiceItem],
    ) -> bool {
        let number = &invoice.invoice.invoice_number;
        info!(
            to = %invoice.customer_email,
            invoice_number = %number,
            "SIMULATION: Email would be sent"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!(
            to = %invoice.customer_email,
            invoice_number = %number,
            "SIMULATION: Email successfully sent"
        );
        EMAILS_TOTAL.with_label_values(&["simulation", "sent"]).inc();
        true
    }

    async fn send_test_email(&self, to: &str, _subject: &str, _body: &str) -> bool {
        info!(to = %to, "SIMULATION: Test email would be sent");
        tokio::time::sleep(Duration::from_millis(300)).await;
        info!(to = %to, "SIMULATION: Test email successfully sent");
        EMAILS_TOTAL.with_label_values(&["simulation", "sent"]).inc();
        true
    }

    fn mode(&self) -> &'static str {
        "Simulation"
    }
}

const STYLE_BLOCK: &str = "    <style>
        body { font-family: Arial, sans-serif; margin: 20px; color: #333; }
        .header { background-color: #4CAF50; color: white; padding: 20px; text-align: center; }
        .invoice-details { margin: 20px 0; }
        .customer-info { background-color: #f9f9f9; padding: 15px; margin: 10px 0; }
        .items-table { width: 100%; border-collapse: collapse; margin: 20px 0; }
        .items-table th, .items-table td { border: 1px solid #ddd; padding: 12px; text-align: left; }
        .items-table th { background-color: #f2f2f2; font-weight: bold; }
        .totals { text-align: right; margin: 20px 0; }
        .total-row { font-weight: bold; font-size: 18px; }
        .footer { margin-top: 30px; text-align: center; color: #666; font-size: 12px; }
    </style>
";

/// Render the HTML body of an invoice email.
pub fn render_invoice_html(record: &InvoiceWithCustomer, items: &[InvoiceItem]) -> String {
    let invoice = &record.invoice;
    let number = &invoice.invoice_number;

    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n    <meta charset='utf-8'>\n");
    html.push_str(&format!("    <title>Invoice #{}</title>\n", number));
    html.push_str(STYLE_BLOCK);
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!(
        "    <div class='header'>\n        <h1>INVOICE</h1>\n        <h2>#{}</h2>\n    </div>\n",
        number
    ));

    html.push_str("    <div class='invoice-details'>\n");
    html.push_str(&format!(
        "        <p><strong>Invoice Date:</strong> {}</p>\n",
        invoice.invoice_date.format("%B %d, %Y")
    ));
    if let Some(due_date) = invoice.due_date {
        html.push_str(&format!(
            "        <p><strong>Due Date:</strong> {}</p>\n",
            due_date.format("%B %d, %Y")
        ));
    }
    html.push_str(&format!(
        "        <p><strong>Status:</strong> {}</p>\n    </div>\n",
        invoice.status
    ));

    html.push_str("    <div class='customer-info'>\n        <h3>Bill To:</h3>\n");
    html.push_str(&format!(
        "        <p><strong>{}</strong></p>\n        <p>{}</p>\n",
        record.customer_name, record.customer_email
    ));
    if let Some(phone) = record.customer_phone.as_deref().filter(|p| !p.is_empty()) {
        html.push_str(&format!("        <p>{}</p>\n", phone));
    }
    if let Some(address) = invoice.billing_address.as_deref().filter(|a| !a.is_empty()) {
        html.push_str(&format!("        <p>{}</p>\n", address));
        html.push_str(&format!(
            "        <p>{}, {} {}</p>\n",
            invoice.billing_city.as_deref().unwrap_or(""),
            invoice.billing_state.as_deref().unwrap_or(""),
            invoice.billing_zip_code.as_deref().unwrap_or("")
        ));
        if let Some(country) = invoice.billing_country.as_deref().filter(|c| !c.is_empty()) {
            html.push_str(&format!("        <p>{}</p>\n", country));
        }
    }
    html.push_str("    </div>\n");

    // Ship To appears only when it carries information of its own.
    if let Some(shipping) = invoice
        .shipping_address
        .as_deref()
        .filter(|s| !s.is_empty() && invoice.billing_address.as_deref() != Some(*s))
    {
        html.push_str("    <div class='customer-info'>\n        <h3>Ship To:</h3>\n");
        html.push_str(&format!("        <p>{}</p>\n", shipping));
        html.push_str(&format!(
            "        <p>{}, {} {}</p>\n",
            invoice.shipping_city.as_deref().unwrap_or(""),
            invoice.shipping_state.as_deref().unwrap_or(""),
            invoice.shipping_zip_code.as_deref().unwrap_or("")
        ));
        if let Some(country) = invoice
            .shipping_country
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            html.push_str(&format!("        <p>{}</p>\n", country));
        }
        html.push_str("    </div>\n");
    }

    html.push_str(
        "    <table class='items-table'>\n        <thead>\n            <tr>\n                <th>Item</th>\n                <th>Description</th>\n                <th>Qty</th>\n                <th>Unit Price</th>\n                <th>Discount</th>\n                <th>Total</th>\n            </tr>\n        </thead>\n        <tbody>\n",
    );
    for item in items {
        let discount = if item.discount_percentage > Decimal::ZERO {
            format!("{}% (${:.2})", item.discount_percentage, item.discount_amount)
        } else {
            "-".to_string()
        };
        html.push_str(&format!(
            "            <tr>\n                <td>{}</td>\n                <td>{}</td>\n                <td>{} {}</td>\n                <td>${:.2}</td>\n                <td>{}</td>\n                <td>${:.2}</td>\n            </tr>\n",
            item.product_name,
            item.description.as_deref().unwrap_or(""),
            item.quantity,
            item.unit.as_deref().unwrap_or(""),
            item.unit_price,
            discount,
            item.line_total
        ));
    }
    html.push_str("        </tbody>\n    </table>\n");

    html.push_str("    <div class='totals'>\n");
    html.push_str(&format!(
        "        <p><strong>Subtotal: ${:.2}</strong></p>\n",
        invoice.subtotal
    ));
    if invoice.tax_rate > Decimal::ZERO {
        html.push_str(&format!(
            "        <p>Tax ({}%): ${:.2}</p>\n",
            invoice.tax_rate, invoice.tax_amount
        ));
    }
    html.push_str(&format!(
        "        <p class='total-row'>Total Amount: ${:.2}</p>\n    </div>\n",
        invoice.total_amount
    ));

    if let Some(notes) = invoice.notes.as_deref().filter(|n| !n.is_empty()) {
        html.push_str(&format!(
            "    <div class='customer-info'>\n        <h3>Notes:</h3>\n        <p>{}</p>\n    </div>\n",
            notes
        ));
    }

    html.push_str(
        "    <div class='footer'>\n        <p>Thank you for your business!</p>\n        <p>This is an automated email from the Invoicing System.</p>\n    </div>\n</body>\n</html>",
    );

    html
}

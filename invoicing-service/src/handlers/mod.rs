//! HTTP handlers for the invoicing API.

pub mod customers;
pub mod health;
pub mod invoices;

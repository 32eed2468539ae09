//! Domain models for invoicing-service.

mod customer;
mod invoice;
mod invoice_item;

pub use customer::Customer;
pub use invoice::{Invoice, InvoiceWithCustomer};
pub use invoice_item::InvoiceItem;

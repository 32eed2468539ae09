//! service-core: Shared infrastructure for the invoicing platform.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod response;
pub mod retry;

pub use error::AppError;
pub use response::ApiResponse;

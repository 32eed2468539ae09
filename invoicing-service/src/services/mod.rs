//! Services module for invoicing-service.

pub mod calculation;
pub mod database;
pub mod email;
pub mod metrics;
pub mod procedures;

pub use database::Database;
pub use email::{Mailer, SimulatedMailer, SmtpMailer};
pub use metrics::{get_metrics, init_metrics};
pub use procedures::ProcedureGateway;

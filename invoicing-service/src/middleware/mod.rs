pub mod api_key;
pub mod metrics;

pub use api_key::{require_api_key, ApiKeySettings, API_KEY_HEADER};
pub use metrics::track_http_metrics;

//! Customer request payloads.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

/// Body for creating or updating a customer. Field rules mirror the
/// customer table constraints so bad input is rejected before any query.
/// Absent fields bind to their defaults and fail validation rather than
/// deserialization, keeping the error envelope uniform.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(
        email(message = "A valid email address is required"),
        length(max = 255, message = "Email cannot exceed 255 characters")
    )]
    pub email: String,
    #[validate(length(max = 20, message = "Phone cannot exceed 20 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 255, message = "Billing address cannot exceed 255 characters"))]
    pub billing_address: Option<String>,
    #[validate(length(max = 100, message = "City cannot exceed 100 characters"))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(max = 20, message = "Zip code cannot exceed 20 characters"))]
    pub zip_code: Option<String>,
    #[validate(length(max = 100, message = "Country cannot exceed 100 characters"))]
    pub country: Option<String>,
    #[validate(length(max = 255, message = "Shipping address cannot exceed 255 characters"))]
    pub shipping_address: Option<String>,
    #[validate(length(max = 100, message = "Shipping city cannot exceed 100 characters"))]
    pub shipping_city: Option<String>,
    #[validate(length(max = 100, message = "Shipping state cannot exceed 100 characters"))]
    pub shipping_state: Option<String>,
    #[validate(length(max = 20, message = "Shipping zip code cannot exceed 20 characters"))]
    pub shipping_zip_code: Option<String>,
    #[validate(length(max = 100, message = "Shipping country cannot exceed 100 characters"))]
    pub shipping_country: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CustomerRequest {
        serde_json::from_value(serde_json::json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "state": "CA"
        }))
        .unwrap()
    }

    #[test]
    fn minimal_payload_is_valid() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut request = valid_request();
        request.email = "not-an-email".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn rejects_blank_required_fields() {
        let mut request = valid_request();
        request.first_name = String::new();
        request.state = String::new();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("first_name"));
        assert!(errors.field_errors().contains_key("state"));
    }
}

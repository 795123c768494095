//! Identity provider wire DTOs (OAuth2 client-credentials with client assertion)

use serde::{Deserialize, Serialize};

/// Grant type sent with every exchange
pub const GRANT_TYPE: &str = "client_credentials";

/// Client assertion type for federated workload identity
pub const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Form body of the token exchange request
#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeForm<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_assertion_type: &'a str,
    pub client_assertion: &'a str,
    pub scope: &'a str,
}

/// Successful token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// OAuth2 error response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

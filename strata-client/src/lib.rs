//! Strata HTTP Clients
//!
//! HTTP implementations of the two external boundaries the engine consumes:
//! - `ProvisioningClient`: the cloud provisioning backend (`get-state`, `apply-diff`)
//! - `IdentityClient`: the identity provider's token exchange endpoint
//!
//! Both implement the traits from `strata_core::backend`, so the engine never
//! depends on reqwest directly.
//!
//! # Example
//!
//! ```no_run
//! use strata_client::ProvisioningClient;
//! use strata_core::domain::resource::ResourceDescriptor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ProvisioningClient::new("http://localhost:8080");
//!     let state = client
//!         .get_resource(&ResourceDescriptor::new("compute", "cpu-cluster"), "token")
//!         .await?;
//!     println!("exists: {}", state.is_some());
//!     Ok(())
//! }
//! ```

pub mod error;
mod identity;
mod resources;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use identity::IdentityClient;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the provisioning backend API
#[derive(Debug, Clone)]
pub struct ProvisioningClient {
    /// Base URL of the backend (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ProvisioningClient {
    /// Create a new provisioning client
    ///
    /// # Example
    /// ```
    /// use strata_client::ProvisioningClient;
    ///
    /// let client = ProvisioningClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new provisioning client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Check the status code and deserialize a JSON body
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

//! Identity provider token exchange

use async_trait::async_trait;
use reqwest::Client;
use strata_core::backend::IdentityProvider;
use strata_core::domain::credential::{Assertion, IssuedToken, Scope};
use strata_core::dto::token::{ASSERTION_TYPE, GRANT_TYPE, TokenExchangeForm, TokenResponse};
use strata_core::error::AuthError;
use tracing::debug;

use crate::error::Result;
use crate::handle_response;

/// HTTP client for an OAuth2 token endpoint accepting federated assertions
#[derive(Debug, Clone)]
pub struct IdentityClient {
    /// Full token endpoint URL
    token_url: String,
    /// Application (client) id the federated credential is registered on
    client_id: String,
    client: Client,
}

impl IdentityClient {
    /// Create a new identity client
    ///
    /// # Arguments
    /// * `token_url` - Token endpoint, e.g. "https://login.example.com/tenant/oauth2/v2.0/token"
    /// * `client_id` - Client id the workload identity federation is configured for
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::with_client(token_url, client_id, Client::new())
    }

    /// Create a new identity client with a custom HTTP client
    pub fn with_client(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange an assertion for an access token
    pub async fn request_token(&self, assertion: &str, scope: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&TokenExchangeForm {
                grant_type: GRANT_TYPE,
                client_id: &self.client_id,
                client_assertion_type: ASSERTION_TYPE,
                client_assertion: assertion,
                scope,
            })
            .send()
            .await?;

        handle_response(response).await
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn exchange(
        &self,
        assertion: &Assertion,
        scope: &Scope,
    ) -> std::result::Result<IssuedToken, AuthError> {
        debug!(
            "Exchanging assertion from {} for scope {}",
            assertion.issuer, scope
        );

        let token = self
            .request_token(&assertion.value, scope.as_str())
            .await
            .map_err(|e| e.into_auth_error())?;

        Ok(IssuedToken {
            value: token.access_token,
            expires_in: chrono::Duration::seconds(token.expires_in.max(0)),
        })
    }
}

//! OAuth2 client-credentials token exchange
//!
//! One token endpoint interaction: POST the `client_credentials` grant as an
//! `application/x-www-form-urlencoded` body and parse the token response.
//! No user is involved — the service authenticates with the client ID/secret
//! pair held by the vault.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The cache
/// converts it to an absolute unix millisecond timestamp at storage time.
/// Extra fields (scope, token_type) are ignored.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

/// Exchange a client ID/secret pair for a bearer token.
///
/// Non-2xx responses surface as `TokenExchange` with the upstream status and
/// body text so callers can log the cause; nothing is retried here.
pub async fn exchange_client_credentials(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange {
            status: status.as_u16(),
            body: format!("invalid token response: {e}"),
        })
}

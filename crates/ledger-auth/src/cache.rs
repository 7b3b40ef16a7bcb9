//! Bearer token cache with near-expiry refresh
//!
//! Holds at most one token, fetched via the client-credentials grant from
//! the vault's current pair. A cached token is served only while more than
//! 60 seconds remain before expiry AND it was fetched under the vault's
//! current generation — rotating credentials makes the old token
//! unservable immediately, regardless of wall-clock expiry.
//!
//! The read-check / exchange / write sequence is deliberately not
//! single-flight: concurrent callers hitting an expired cache may each
//! perform an exchange, and the last write wins. The exchange is idempotent
//! and creates no upstream resource, so this race is tolerated.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::token::exchange_client_credentials;
use crate::vault::Vault;

/// Tokens within this margin of expiry are treated as stale and re-fetched.
pub const REFRESH_MARGIN_MILLIS: u64 = 60_000;

/// Millisecond clock, injectable for deterministic expiry tests.
type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn system_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One cached token and the conditions under which it may be served.
struct CachedToken {
    access_token: String,
    /// Absolute expiry as unix milliseconds (issuance time + `expires_in`)
    expires_at: u64,
    /// Vault generation the token was fetched under
    generation: u64,
}

/// Token cache backed by the credential vault.
pub struct TokenCache {
    vault: Arc<Vault>,
    client: reqwest::Client,
    token_url: String,
    state: RwLock<Option<CachedToken>>,
    clock: Clock,
}

impl TokenCache {
    /// Create a cache using the system clock.
    pub fn new(vault: Arc<Vault>, client: reqwest::Client, token_url: String) -> Self {
        Self::with_clock(vault, client, token_url, system_now_millis)
    }

    /// Create a cache with an injected millisecond clock (used by tests to
    /// cross the expiry boundary deterministically).
    pub fn with_clock(
        vault: Arc<Vault>,
        client: reqwest::Client,
        token_url: String,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            vault,
            client,
            token_url,
            state: RwLock::new(None),
            clock: Box::new(clock),
        }
    }

    /// Return a currently-valid bearer token, exchanging credentials for a
    /// fresh one when the cache is empty, stale, or from rotated-away
    /// credentials.
    ///
    /// On exchange failure nothing is mutated; the cached entry (if any)
    /// stays as-is and the error surfaces to the caller.
    pub async fn get_access_token(&self) -> Result<String> {
        // Sampled before the exchange: a rotation that lands mid-flight
        // stores the fresh token under a stale generation, forcing the next
        // call to re-fetch. Harmless, the exchange is idempotent.
        let generation = self.vault.generation();
        let now = (self.clock)();

        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref()
                && cached.generation == generation
                && now + REFRESH_MARGIN_MILLIS < cached.expires_at
            {
                debug!("serving cached token");
                return Ok(cached.access_token.clone());
            }
        }

        let credential = self.vault.reveal().await?;
        debug!(client_id = %credential.client_id, "exchanging credentials for token");

        let token = match exchange_client_credentials(
            &self.client,
            &self.token_url,
            &credential.client_id,
            &credential.client_secret,
        )
        .await
        {
            Ok(token) => {
                metrics::counter!("token_exchanges_total", "outcome" => "success").increment(1);
                token
            }
            Err(e) => {
                metrics::counter!("token_exchanges_total", "outcome" => "failure").increment(1);
                warn!(error = %e, "token exchange failed, cache unchanged");
                return Err(e);
            }
        };

        let expires_at = now + token.expires_in.saturating_mul(1000);
        *self.state.write().await = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
            generation,
        });
        info!(expires_in = token.expires_in, "token cached");
        Ok(token.access_token)
    }

    /// Whether a token is currently cached (regardless of freshness).
    pub async fn has_cached_token(&self) -> bool {
        self.state.read().await.is_some()
    }
}

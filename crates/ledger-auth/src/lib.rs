//! Ledger API authentication library
//!
//! Provides the encrypted credential vault, OAuth2 client-credentials token
//! exchange, and the near-expiry token cache for the ledger proxy. This
//! crate is a standalone library with no dependency on the proxy binary —
//! it can be tested and used independently.
//!
//! Credential flow:
//! 1. Operator stores a client ID/secret pair via `Vault::set_credentials()`
//!    (encrypted in process memory, never persisted)
//! 2. `TokenCache::get_access_token()` reveals the pair on demand and
//!    exchanges it at the token endpoint
//! 3. The resulting bearer token is cached until 60 seconds before expiry
//! 4. Rotating credentials bumps the vault generation, which invalidates
//!    any token cached under the old pair

pub mod cache;
pub mod error;
pub mod token;
pub mod vault;

pub use cache::{REFRESH_MARGIN_MILLIS, TokenCache};
pub use error::{Error, Result};
pub use token::{TokenResponse, exchange_client_credentials};
pub use vault::{Credential, Vault};

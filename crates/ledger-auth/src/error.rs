//! Error types for vault and token operations

/// Errors from credential storage and token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credentials: {0}")]
    Validation(String),

    #[error("Credentials not set")]
    NotConfigured,

    #[error("credential encryption failed: {0}")]
    Encryption(String),

    #[error("credential decryption failed: {0}")]
    Decryption(String),

    #[error("token exchange failed: HTTP {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_message_matches_api_contract() {
        // The HTTP layer forwards this message verbatim in the error envelope.
        assert_eq!(Error::NotConfigured.to_string(), "Credentials not set");
    }

    #[test]
    fn token_exchange_display_carries_status_and_body() {
        let err = Error::TokenExchange {
            status: 401,
            body: r#"{"error":"invalid_client"}"#.into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"), "got: {msg}");
        assert!(msg.contains("invalid_client"), "got: {msg}");
    }
}

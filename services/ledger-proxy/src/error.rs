//! Handler error type and the JSON error envelope
//!
//! Every failure on a request path converts into the
//! `{"error": "...", "details": "..."}` envelope here; nothing panics and
//! nothing is retried. Token exchange failures keep the authorization
//! server's status and body in the server log only — clients get a generic
//! 500 rather than the upstream response verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

/// Build the JSON error envelope all handlers emit.
pub fn envelope(status: StatusCode, message: &str, details: Option<&str>) -> Response {
    let body = match details {
        Some(details) => serde_json::json!({ "error": message, "details": details }),
        None => serde_json::json!({ "error": message }),
    };
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Request-path failures, mapped onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or incomplete client input
    #[error("{0}")]
    Validation(String),

    /// Vault or token cache failure
    #[error(transparent)]
    Auth(#[from] ledger_auth::Error),

    /// Ledger API returned a non-2xx; status and body are forwarded verbatim
    #[error("upstream returned {status}")]
    UpstreamStatus { status: u16, body: String },

    /// Ledger API unreachable or the response could not be read
    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => envelope(StatusCode::BAD_REQUEST, &message, None),

            ApiError::Auth(inner) => match inner {
                ledger_auth::Error::Validation(message) => {
                    envelope(StatusCode::BAD_REQUEST, &message, None)
                }
                ledger_auth::Error::NotConfigured => envelope(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Credentials not set",
                    None,
                ),
                ledger_auth::Error::Encryption(details)
                | ledger_auth::Error::Decryption(details) => {
                    error!(details = %details, "credential decryption failed");
                    envelope(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "credential decryption failed",
                        None,
                    )
                }
                ledger_auth::Error::TokenExchange { status, body } => {
                    // Logged server-side, not forwarded to the client verbatim
                    warn!(status, body = %body, "token exchange rejected");
                    envelope(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "token exchange failed",
                        None,
                    )
                }
                ledger_auth::Error::Http(details) => {
                    warn!(details = %details, "token endpoint unreachable");
                    envelope(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "token exchange failed",
                        Some(&details),
                    )
                }
            },

            ApiError::UpstreamStatus { status, body } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status,
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    body,
                )
                    .into_response()
            }

            ApiError::UpstreamTransport(details) => {
                warn!(details = %details, "upstream request failed");
                envelope(
                    StatusCode::BAD_GATEWAY,
                    "upstream request failed",
                    Some(&details),
                )
            }
        }
    }
}

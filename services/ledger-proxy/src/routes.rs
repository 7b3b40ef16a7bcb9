//! API routes
//!
//! The credential endpoint, the connection test, and the `/api/ledger/...`
//! forwarding surface. Everything here is a thin layer over the vault, the
//! token cache, and `proxy::forward_to_ledger` — the frontend owns retry
//! policy, the proxy owns authentication.

use std::collections::HashMap;

use axum::extract::{Path, RawQuery, State};
use axum::http::Method;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::proxy::{ProxyState, fetch_from_ledger, forward_to_ledger};

/// Build the API router over the shared proxy state.
pub fn api_router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/credentials", post(set_credentials))
        .route("/api/test-connection", post(test_connection))
        .route(
            "/api/ledger/{ledger}/accounts",
            get(list_accounts).post(list_accounts),
        )
        .route(
            "/api/ledger/{ledger}/transactions",
            get(list_transactions).post(list_transactions),
        )
        .route(
            "/api/ledger/{ledger}/volumes",
            get(list_volumes).post(list_volumes),
        )
        .route(
            "/api/ledger/{ledger}/account-balances",
            get(account_balances).post(account_balances),
        )
        .route(
            "/api/ledger/{ledger}/accounts/{address}/metadata",
            post(account_metadata),
        )
        .route(
            "/api/ledger/{ledger}/transactions/{id}/metadata",
            post(transaction_metadata),
        )
        .route("/api/ledger/{ledger}/{resource}/filter", post(filter_query))
        .with_state(state)
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Body for POST /api/credentials. Field names match the frontend payload.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CredentialsRequest {
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// POST /api/credentials — store a new credential pair in the vault.
///
/// 400 when either field is missing or blank; the previously stored pair
/// stays untouched in that case. A successful write invalidates any cached
/// token via the vault generation.
async fn set_credentials(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: CredentialsRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;

    let client_id = request.client_id.unwrap_or_default();
    let client_secret = request.client_secret.unwrap_or_default();
    state
        .vault
        .set_credentials(&client_id, &client_secret)
        .await?;

    info!("credentials replaced via API");
    Ok(Json(json!({ "ok": true })))
}

/// Body for POST /api/test-connection.
#[derive(Debug, Default, Deserialize)]
struct TestConnectionRequest {
    ledger: Option<String>,
}

/// POST /api/test-connection — exchange for a token and probe the ledger.
///
/// Reports the upstream result instead of forwarding it: the frontend shows
/// `{ok, status, body}` as a connectivity diagnosis, 2xx or not.
async fn test_connection(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: TestConnectionRequest = if body.is_empty() {
        TestConnectionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?
    };
    let ledger = request
        .ledger
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "default".to_string());

    let (status, body) = fetch_from_ledger(&state, &ledger, None, None).await?;
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));
    Ok(Json(json!({
        "ok": (200..300).contains(&status),
        "status": status,
        "body": body,
    })))
}

/// GET/POST /api/ledger/{ledger}/accounts
async fn list_accounts(
    State(state): State<ProxyState>,
    Path(ledger): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    passthrough(&state, method, &ledger, "accounts", query, body).await
}

/// GET/POST /api/ledger/{ledger}/transactions
async fn list_transactions(
    State(state): State<ProxyState>,
    Path(ledger): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    passthrough(&state, method, &ledger, "transactions", query, body).await
}

/// GET/POST /api/ledger/{ledger}/volumes
async fn list_volumes(
    State(state): State<ProxyState>,
    Path(ledger): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    passthrough(&state, method, &ledger, "volumes", query, body).await
}

/// POST /api/ledger/{ledger}/accounts/{address}/metadata
///
/// The upstream answers 204 on success, which passes through unchanged.
async fn account_metadata(
    State(state): State<ProxyState>,
    Path((ledger, address)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let path = format!("{ledger}/accounts/{address}/metadata");
    forward_to_ledger(
        &state,
        Method::POST,
        &path,
        None,
        Some(body),
        &new_request_id(),
    )
    .await
}

/// POST /api/ledger/{ledger}/transactions/{id}/metadata
async fn transaction_metadata(
    State(state): State<ProxyState>,
    Path((ledger, id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let path = format!("{ledger}/transactions/{id}/metadata");
    forward_to_ledger(
        &state,
        Method::POST,
        &path,
        None,
        Some(body),
        &new_request_id(),
    )
    .await
}

/// POST /api/ledger/{ledger}/{resource}/filter
///
/// The ledger API expects list filters as a GET carrying a JSON body, which
/// browsers cannot send — so the frontend POSTs here and the proxy re-issues
/// the request as GET-with-body upstream.
async fn filter_query(
    State(state): State<ProxyState>,
    Path((ledger, resource)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let path = format!("{ledger}/{resource}");
    forward_to_ledger(
        &state,
        Method::GET,
        &path,
        query.as_deref(),
        Some(body),
        &new_request_id(),
    )
    .await
}

/// GET/POST /api/ledger/{ledger}/account-balances
///
/// The ledger API has no single endpoint for "accounts with their balances",
/// so the proxy fetches accounts (with the caller's filter applied) and
/// volumes, then joins them into one row per account.
async fn account_balances(
    State(state): State<ProxyState>,
    Path(ledger): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let (status, accounts_body) = fetch_from_ledger(
        &state,
        &format!("{ledger}/accounts"),
        query.as_deref(),
        Some(body),
    )
    .await?;
    if !(200..300).contains(&status) {
        return Err(ApiError::UpstreamStatus {
            status,
            body: accounts_body,
        });
    }

    let (status, volumes_body) =
        fetch_from_ledger(&state, &format!("{ledger}/volumes"), None, None).await?;
    if !(200..300).contains(&status) {
        return Err(ApiError::UpstreamStatus {
            status,
            body: volumes_body,
        });
    }

    let accounts: Value = serde_json::from_str(&accounts_body)
        .map_err(|e| ApiError::UpstreamTransport(format!("invalid accounts payload: {e}")))?;
    let volumes: Value = serde_json::from_str(&volumes_body)
        .map_err(|e| ApiError::UpstreamTransport(format!("invalid volumes payload: {e}")))?;

    let rows = join_account_balances(&accounts, &volumes);
    Ok(Json(json!({ "data": rows })))
}

async fn passthrough(
    state: &ProxyState,
    method: Method,
    ledger: &str,
    tail: &str,
    query: Option<String>,
    body: Bytes,
) -> Response {
    let path = format!("{ledger}/{tail}");
    forward_to_ledger(
        state,
        method,
        &path,
        query.as_deref(),
        Some(body),
        &new_request_id(),
    )
    .await
}

/// Items of a paginated ledger payload: `cursor.data` in current API
/// versions, bare `data` in older ones.
fn cursor_items(payload: &Value) -> &[Value] {
    payload
        .pointer("/cursor/data")
        .or_else(|| payload.get("data"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Join accounts with per-asset volumes into `{account, balances, metadata}`
/// rows. Accounts without volume entries get empty balances.
fn join_account_balances(accounts: &Value, volumes: &Value) -> Vec<Value> {
    let mut balances_by_account: HashMap<&str, serde_json::Map<String, Value>> = HashMap::new();
    for entry in cursor_items(volumes) {
        let Some(account) = entry.get("account").and_then(Value::as_str) else {
            continue;
        };
        let Some(asset) = entry.get("asset").and_then(Value::as_str) else {
            continue;
        };
        let balance = entry.get("balance").cloned().or_else(|| {
            let input = entry.get("input").and_then(Value::as_i64)?;
            let output = entry.get("output").and_then(Value::as_i64)?;
            Some(Value::from(input - output))
        });
        balances_by_account
            .entry(account)
            .or_default()
            .insert(asset.to_string(), balance.unwrap_or(Value::Null));
    }

    cursor_items(accounts)
        .iter()
        .filter_map(|account| {
            let address = account.get("address").and_then(Value::as_str)?;
            let metadata = account.get("metadata").cloned().unwrap_or_else(|| json!({}));
            let balances = balances_by_account
                .get(address)
                .cloned()
                .map(Value::Object)
                .unwrap_or_else(|| json!({}));
            Some(json!({
                "account": address,
                "balances": balances,
                "metadata": metadata,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_items_reads_nested_and_flat_shapes() {
        let nested = json!({"cursor": {"data": [{"address": "a"}]}});
        assert_eq!(cursor_items(&nested).len(), 1);

        let flat = json!({"data": [{"address": "a"}, {"address": "b"}]});
        assert_eq!(cursor_items(&flat).len(), 2);

        let neither = json!({"accounts": []});
        assert!(cursor_items(&neither).is_empty());
    }

    #[test]
    fn join_builds_one_row_per_account() {
        let accounts = json!({"cursor": {"data": [
            {"address": "world", "metadata": {}},
            {"address": "users:alice", "metadata": {"tier": "gold"}},
        ]}});
        let volumes = json!({"cursor": {"data": [
            {"account": "users:alice", "asset": "USD", "input": 500, "output": 120, "balance": 380},
            {"account": "users:alice", "asset": "EUR", "input": 10, "output": 0, "balance": 10},
            {"account": "world", "asset": "USD", "input": 0, "output": 500, "balance": -500},
        ]}});

        let rows = join_account_balances(&accounts, &volumes);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0]["account"], "world");
        assert_eq!(rows[0]["balances"]["USD"], -500);

        assert_eq!(rows[1]["account"], "users:alice");
        assert_eq!(rows[1]["balances"]["USD"], 380);
        assert_eq!(rows[1]["balances"]["EUR"], 10);
        assert_eq!(rows[1]["metadata"]["tier"], "gold");
    }

    #[test]
    fn join_account_without_volumes_gets_empty_balances() {
        let accounts = json!({"cursor": {"data": [{"address": "users:bob"}]}});
        let volumes = json!({"cursor": {"data": []}});

        let rows = join_account_balances(&accounts, &volumes);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["balances"], json!({}));
        assert_eq!(rows[0]["metadata"], json!({}));
    }

    #[test]
    fn join_computes_balance_from_input_output_when_absent() {
        let accounts = json!({"data": [{"address": "users:carol"}]});
        let volumes = json!({"data": [
            {"account": "users:carol", "asset": "USD", "input": 700, "output": 150},
        ]});

        let rows = join_account_balances(&accounts, &volumes);
        assert_eq!(rows[0]["balances"]["USD"], 550);
    }

    #[test]
    fn join_skips_malformed_volume_entries() {
        let accounts = json!({"data": [{"address": "users:dave"}]});
        let volumes = json!({"data": [
            {"asset": "USD", "balance": 5},
            {"account": "users:dave", "balance": 5},
            {"account": "users:dave", "asset": "USD", "balance": 42},
        ]});

        let rows = join_account_balances(&accounts, &volumes);
        assert_eq!(rows[0]["balances"], json!({"USD": 42}));
    }

    #[test]
    fn request_ids_carry_the_req_prefix() {
        let id = new_request_id();
        assert!(id.starts_with("req_"), "got: {id}");
        assert_ne!(id, new_request_id());
    }
}

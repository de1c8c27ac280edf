//! Minimal JSON-RPC 2.0 client.

use crate::LedgerError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Per-request I/O timeout mandated by the suspension budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct RpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issues one call and unwraps the JSON-RPC envelope.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        trace!("rpc -> {method} (id {id})");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;
        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LedgerError::Rpc(message));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Response("missing result field".into()))
    }
}

/// Decodes a `0x`-prefixed hex quantity.
pub fn decode_hex_u64(value: &Value) -> Result<u64, LedgerError> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::Response(format!("expected hex string, got {value}")))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|_| LedgerError::Response(format!("bad hex quantity '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hex_quantities() {
        assert_eq!(decode_hex_u64(&json!("0x539")).unwrap(), 1337);
        assert_eq!(decode_hex_u64(&json!("0x0")).unwrap(), 0);
        assert_eq!(decode_hex_u64(&json!("1a")).unwrap(), 26);
        assert!(decode_hex_u64(&json!("zz")).is_err());
        assert!(decode_hex_u64(&json!(12)).is_err());
    }
}

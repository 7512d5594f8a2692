//! RPC transport for contract invocations.
//!
//! [`RpcTransport`] is dyn-compatible (boxed futures) so the gateway can hold
//! an `Arc<dyn RpcTransport>` and tests can swap in [`MockRpcTransport`].

use crate::descriptor::EncodedCall;
use crate::error::{ContractError, ContractResult};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Sends encoded calls and returns the raw `{type, value}` result.
pub trait RpcTransport: Send + Sync {
    fn invoke(&self, call: EncodedCall) -> BoxFuture<'_, ContractResult<Value>>;
}

/// Arc wrapper for RpcTransport trait objects.
pub type DynRpcTransport = Arc<dyn RpcTransport>;

/// Default timeout for RPC requests.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 transport over HTTP (`invokeContract`).
pub struct HttpRpcTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpcTransport {
    pub fn new(url: impl Into<String>) -> ContractResult<Self> {
        Self::with_timeout(url, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> ContractResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContractError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, call: EncodedCall) -> ContractResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "invokeContract",
            "params": call,
        });
        debug!(id, method = %call_method(&request), url = %self.url, "RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ContractError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContractError::Transport(format!(
                "HTTP {} {}: {body}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ContractError::Decode(format!("RPC response: {e}")))?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(ContractError::Rejected {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ContractError::Decode(
                "RPC response has neither result nor error".to_string(),
            )),
        }
    }
}

fn call_method(request: &Value) -> &str {
    request["params"]["method"].as_str().unwrap_or("?")
}

impl RpcTransport for HttpRpcTransport {
    fn invoke(&self, call: EncodedCall) -> BoxFuture<'_, ContractResult<Value>> {
        Box::pin(self.post(call))
    }
}

/// Mock transport for testing.
///
/// Records every call and replays scripted results in order. With nothing
/// scripted, calls fail with a transport error.
#[derive(Debug, Default)]
pub struct MockRpcTransport {
    calls: Mutex<Vec<EncodedCall>>,
    responses: Mutex<VecDeque<ContractResult<Value>>>,
}

impl MockRpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next call.
    pub fn push_response(&self, response: ContractResult<Value>) {
        self.responses.lock().push_back(response);
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> Vec<EncodedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl RpcTransport for MockRpcTransport {
    fn invoke(&self, call: EncodedCall) -> BoxFuture<'_, ContractResult<Value>> {
        Box::pin(async move {
            self.calls.lock().push(call);
            self.responses.lock().pop_front().unwrap_or_else(|| {
                Err(ContractError::Transport(
                    "no scripted response".to_string(),
                ))
            })
        })
    }
}

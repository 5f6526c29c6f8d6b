use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Result;

use super::provider::{ProviderError, ProviderFuture, WalletProvider};

/// Wallet provider backed by a JSON-RPC node over HTTP (e.g. a local dev chain).
#[derive(Debug)]
pub struct JsonRpcProvider {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

impl JsonRpcProvider {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            url: Url::parse(url)?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(id, method, "json-rpc request");
        let resp = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("rpc request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::transport(format!(
                "rpc endpoint returned HTTP {status}: {text}"
            )));
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("invalid rpc response: {e}")))?;

        match (parsed.result, parsed.error) {
            (_, Some(err)) => Err(err),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

impl WalletProvider for JsonRpcProvider {
    fn request(&self, method: &str, params: Value) -> ProviderFuture<'_> {
        let method = method.to_string();
        Box::pin(async move { self.call(&method, params).await })
    }
}

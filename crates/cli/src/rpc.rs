//! Minimal JSON-RPC client for the app server

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    /// Null when the server could not read the request id
    #[allow(dead_code)]
    id: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Input names attached to a parameter error
    pub fn inputs(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("inputs"))
            .and_then(|inputs| inputs.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
    }
}

#[derive(Debug)]
pub enum RpcFailure {
    /// The server answered with an error object
    Remote(JsonRpcError),
    /// The server could not be reached or answered garbage
    Transport(anyhow::Error),
}

pub async fn call_rpc(
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcFailure> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to connect to app server at {}", url))
        .map_err(RpcFailure::Transport)?;
    let response = response
        .json::<JsonRpcResponse>()
        .await
        .context("Failed to parse response")
        .map_err(RpcFailure::Transport)?;
    into_result(response)
}

fn into_result(response: JsonRpcResponse) -> Result<serde_json::Value, RpcFailure> {
    if let Some(error) = response.error {
        return Err(RpcFailure::Remote(error));
    }

    response
        .result
        .ok_or_else(|| RpcFailure::Transport(anyhow::anyhow!("No result in response")))
}

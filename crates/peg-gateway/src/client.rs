//! REST and JSON-RPC client for the chain gateway.
//!
//! Every call goes through the per-route limiter and the retry policy.
//! Gas prices are quoted by the gateway in wei and exposed in gwei.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, Bytes};
use peg_core::BoxFuture;
use peg_executor::{ExecutionGateway, ExecutorError, ExecutorResult, TxReceipt};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::rate_limiter::EndpointLimiter;
use crate::retry::retry_async;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Gateway HTTP client.
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
    limiter: EndpointLimiter,
    rpc_id: AtomicU64,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiter: EndpointLimiter::new(config.min_spacing()),
            config,
            rpc_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // =========================================================================
    // REST endpoints
    // =========================================================================

    /// Current gas price in gwei, rounded up.
    pub async fn gas_price(&self) -> GatewayResult<u64> {
        let path = self.config.endpoint("gas");
        let data = self.required("gas", &path, Method::GET, None).await?;
        let wei = parse_u64(&data, "gasPrice")?;
        Ok(wei.div_ceil(WEI_PER_GWEI))
    }

    pub async fn nonce(&self, address: Address) -> GatewayResult<u64> {
        let path = self.config.endpoint(&format!("nonce/{address}"));
        let data = self.required("nonce", &path, Method::GET, None).await?;
        parse_u64(&data, "nonce")
    }

    pub async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> GatewayResult<u64> {
        let path = self.config.endpoint("gas/estimate");
        let body = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        });
        let response = self.required("gas/estimate", &path, Method::POST, Some(&body)).await?;
        parse_u64(&response, "gasLimit")
    }

    /// Returns the transaction id.
    pub async fn broadcast(&self, signed_tx: &str) -> GatewayResult<String> {
        let path = self.config.endpoint("broadcast");
        let body = json!({ "txData": signed_tx });
        let response = self.required("broadcast", &path, Method::POST, Some(&body)).await?;
        let tx_id = response
            .get("txId")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidResponse("missing txId".to_string()))?;
        info!(%tx_id, "Transaction broadcast accepted");
        Ok(tx_id.to_string())
    }

    /// `None` when the gateway does not know the transaction yet or it is unmined.
    pub async fn transaction_receipt(&self, tx_id: &str) -> GatewayResult<Option<TxReceipt>> {
        let path = self.config.endpoint(&format!("transaction/{tx_id}"));
        match self.request("transaction", &path, Method::GET, None).await? {
            Some(data) => parse_receipt(&data),
            None => Ok(None),
        }
    }

    /// Register a webhook for activity on `address`. Returns the subscription id.
    pub async fn monitor_address(&self, address: Address, webhook_url: &str) -> GatewayResult<String> {
        let body = json!({
            "type": "ADDRESS_MONITORING",
            "attr": {
                "address": address.to_string(),
                "chain": self.config.monitoring_chain,
                "url": webhook_url,
            },
        });
        let response = self.required("subscription", "subscription", Method::POST, Some(&body)).await?;
        let id = response
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidResponse("missing subscription id".to_string()))?;
        info!(%address, subscription = id, "Address monitoring registered");
        Ok(id.to_string())
    }

    /// ERC-20 balance of `address` in the token's smallest unit.
    pub async fn token_balance(&self, token: Address, address: Address) -> GatewayResult<u128> {
        let path = self.config.endpoint(&format!("account/balance/{token}/{address}"));
        let data = self.required("account/balance", &path, Method::GET, None).await?;
        let value = data
            .get("balance")
            .ok_or_else(|| GatewayError::InvalidResponse("missing balance".to_string()))?;
        value_to_u128(value).ok_or_else(|| GatewayError::InvalidResponse(format!("invalid balance: {value}")))
    }

    /// One page of the account's transaction history, newest first.
    pub async fn transaction_history(
        &self,
        address: Address,
        page_size: u32,
        offset: u32,
    ) -> GatewayResult<Vec<Value>> {
        let path = self.config.endpoint(&format!(
            "account/transaction/{address}?pageSize={page_size}&offset={offset}"
        ));
        match self.required("account/transaction", &path, Method::GET, None).await? {
            Value::Array(transactions) => Ok(transactions),
            other => Err(GatewayError::InvalidResponse(format!(
                "expected transaction list, got {other}"
            ))),
        }
    }

    /// `None` when the gateway does not know the block.
    pub async fn block_by_hash(&self, hash: &str) -> GatewayResult<Option<Value>> {
        let path = self.config.endpoint(&format!("block/{hash}"));
        self.request("block", &path, Method::GET, None).await
    }

    // =========================================================================
    // JSON-RPC
    // =========================================================================

    /// `eth_call` against the latest block.
    pub async fn eth_call(&self, to: Address, data: &Bytes) -> GatewayResult<Vec<u8>> {
        let url = self.config.resolved_rpc_url();
        let params = json!([
            { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);

        let result = retry_async(
            |_| {
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": self.rpc_id.fetch_add(1, Ordering::Relaxed),
                    "method": "eth_call",
                    "params": params.clone(),
                });
                let url = url.as_str();
                async move {
                    let _permit = self.limiter.acquire("rpc/eth_call").await;
                    let response = self.client.post(url).json(&body).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(GatewayError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    let value: Value = response.json().await?;
                    rpc_result(value)
                }
            },
            self.config.retry,
            GatewayError::is_transient,
        )
        .await?;

        decode_hex(&result)
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn required(
        &self,
        route: &str,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> GatewayResult<Value> {
        self.request(route, path, method, body)
            .await?
            .ok_or_else(|| GatewayError::HttpStatus {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("{path} not found"),
            })
    }

    /// `Ok(None)` on 404.
    ///
    /// `route` names the endpoint without its path parameters and is the limiter key,
    /// so requests for different ids on the same endpoint share one slot.
    async fn request(
        &self,
        route: &str,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> GatewayResult<Option<Value>> {
        let url = self.config.url(path);
        retry_async(
            |attempt| {
                let method = method.clone();
                let url = url.as_str();
                async move {
                    let _permit = self.limiter.acquire(route).await;
                    debug!(%method, route, attempt, "Gateway request");

                    let mut request = self.client.request(method, url);
                    if let Some(key) = &self.config.api_key {
                        request = request.header("x-api-key", key);
                    }
                    if let Some(body) = body {
                        request = request.json(body);
                    }

                    let response = request.send().await?;
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(GatewayError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    Ok(Some(response.json::<Value>().await?))
                }
            },
            self.config.retry,
            GatewayError::is_transient,
        )
        .await
    }
}

impl ExecutionGateway for GatewayClient {
    fn estimate_gas(&self, from: Address, to: Address, data: Bytes) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(GatewayClient::estimate_gas(self, from, to, &data).await?) })
    }

    fn current_gas_price(&self) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(self.gas_price().await?) })
    }

    fn next_nonce(&self, address: Address) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(self.nonce(address).await?) })
    }

    fn broadcast(&self, signed_tx: String) -> BoxFuture<'_, ExecutorResult<String>> {
        Box::pin(async move {
            GatewayClient::broadcast(self, &signed_tx).await.map_err(|e| match e {
                GatewayError::HttpStatus { status, body } if (400..500).contains(&status) => {
                    ExecutorError::BroadcastRejected(format!("HTTP {status}: {body}"))
                }
                other => other.into(),
            })
        })
    }

    fn receipt(&self, tx_id: String) -> BoxFuture<'_, ExecutorResult<Option<TxReceipt>>> {
        Box::pin(async move { Ok(self.transaction_receipt(&tx_id).await?) })
    }
}

// =============================================================================
// Payload parsing
// =============================================================================

/// Integer field given as a number, a decimal string or a 0x hex string.
fn parse_u64(data: &Value, field: &str) -> GatewayResult<u64> {
    let value = data
        .get(field)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing {field}")))?;
    value_to_u64(value).ok_or_else(|| GatewayError::InvalidResponse(format!("invalid {field}: {value}")))
}

fn value_to_u128(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u128::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Pending transactions carry no status yet.
fn parse_receipt(data: &Value) -> GatewayResult<Option<TxReceipt>> {
    let status = match data.get("status") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Bool(b)) => *b,
        Some(other) => match value_to_u64(other) {
            Some(v) => v == 1,
            None => return Err(GatewayError::InvalidResponse(format!("invalid status: {other}"))),
        },
    };
    let gas_used = data.get("gasUsed").and_then(value_to_u64).unwrap_or(0);
    Ok(Some(TxReceipt { gas_used, status }))
}

fn rpc_result(value: Value) -> GatewayResult<String> {
    if let Some(error) = value.get("error") {
        return Err(GatewayError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    value
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidResponse("missing result".to_string()))
}

fn decode_hex(data: &str) -> GatewayResult<Vec<u8>> {
    hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| GatewayError::InvalidResponse(format!("invalid hex: {e}")))
}

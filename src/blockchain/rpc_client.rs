use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::RpcError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, BlockHeader, Transaction};
use crate::retry::{RetryConfig, RetryUtils};

const WEI_PER_NATIVE: f64 = 1e18;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<Value>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Block as returned by `eth_getBlockByHash` / `eth_getBlockByNumber`
#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    hash: String,
    #[serde(rename = "parentHash")]
    parent_hash: String,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    value: String,
}

/// Header-only view, fetched with `include_transactions = false`
#[derive(Debug, Deserialize)]
struct RawHeader {
    number: String,
    hash: String,
    #[serde(rename = "parentHash")]
    parent_hash: String,
    timestamp: String,
}

#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    timeout_seconds: u64,
    retry: RetryConfig,
}

impl RpcClient {
    pub fn new(endpoint: String) -> Self {
        Self::new_with_config(endpoint, 30, RetryConfig::for_rpc())
    }

    /// Client with a custom request timeout and retry policy
    pub fn new_with_config(endpoint: String, timeout_seconds: u64, retry: RetryConfig) -> Self {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("timeout_seconds", serde_json::json!(timeout_seconds))
            .with_metadata("max_attempts", serde_json::json!(retry.max_attempts));
        context.info("Initializing RPC client");

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint,
            timeout_seconds,
            retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn make_request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let context = LogContext::new("rpc_client", "make_request")
            .with_metadata("method", serde_json::json!(method))
            .with_metadata("endpoint", serde_json::json!(self.endpoint));

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        context.trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout { seconds: self.timeout_seconds }
                } else if e.is_connect() {
                    RpcError::Connection(e.to_string())
                } else {
                    RpcError::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(RpcError::RateLimit { seconds });
        }
        if !status.is_success() {
            let error_msg = format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
            return Err(RpcError::Connection(error_msg));
        }

        let body = response.text().await?;
        let rpc_response: JsonRpcResponse = serde_json::from_str(&body)?;

        if let Some(error) = rpc_response.error {
            let rpc_error = match error.code {
                -32700 => RpcError::InvalidResponse("Parse error".to_string()),
                -32600 => RpcError::InvalidResponse("Invalid request".to_string()),
                -32602 => RpcError::InvalidResponse("Invalid params".to_string()),
                -32005 => RpcError::RateLimit { seconds: 60 },
                _ => RpcError::Method { code: error.code, message: error.message },
            };
            return Err(rpc_error);
        }

        // A missing result and an explicit null are both handed back as null
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    /// Issue one request, timing it and recording the outcome
    async fn timed_request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let monitor = PerformanceMonitor::new(&format!("rpc_{}", method));
        let result = self.make_request(method, params).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());
        result
    }

    /// Current chain head; a single attempt, callers poll again on failure
    pub async fn get_latest_block_number(&self) -> Result<u64, RpcError> {
        let value = self.timed_request("eth_blockNumber", vec![]).await?;
        let hex_string = value
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("Block number is not a string".to_string()))?;
        parse_hex_to_u64(hex_string)
    }

    /// Header of the block at `block_number`, without transaction bodies
    pub async fn get_block_header(&self, block_number: u64) -> Result<BlockHeader, RpcError> {
        RetryUtils::retry_rpc("get_block_header", &self.retry, || async {
            let params = vec![
                Value::String(format!("0x{:x}", block_number)),
                Value::Bool(false),
            ];
            let value = self.timed_request("eth_getBlockByNumber", params).await?;
            if value.is_null() {
                return Err(RpcError::BlockNotFound(block_number.to_string()));
            }

            let raw: RawHeader = serde_json::from_value(value)?;
            Ok(BlockHeader {
                number: parse_hex_to_u64(&raw.number)?,
                hash: raw.hash,
                parent_hash: raw.parent_hash,
                timestamp: parse_hex_to_u64(&raw.timestamp)?,
            })
        })
        .await
    }

    /// Full block with transactions, looked up by hash
    pub async fn get_block_by_hash(&self, hash: &str) -> Result<Block, RpcError> {
        RetryUtils::retry_rpc("get_block_by_hash", &self.retry, || async {
            let params = vec![Value::String(hash.to_string()), Value::Bool(true)];
            let value = self.timed_request("eth_getBlockByHash", params).await?;
            if value.is_null() {
                return Err(RpcError::BlockNotFound(hash.to_string()));
            }

            let raw: RawBlock = serde_json::from_value(value)?;
            let block = convert_block(raw)?;

            let context = LogContext::new("rpc_client", "get_block_by_hash")
                .with_block_number(block.number)
                .with_block_hash(&block.hash)
                .with_metadata("transaction_count", serde_json::json!(block.transactions.len()));
            context.debug(&format!(
                "Retrieved block {} with {} transactions",
                block.number,
                block.transactions.len()
            ));

            Ok(block)
        })
        .await
    }
}

fn convert_block(raw: RawBlock) -> Result<Block, RpcError> {
    let number = parse_hex_to_u64(&raw.number)?;
    let timestamp = parse_timestamp(&raw.timestamp)?;

    let transactions = raw
        .transactions
        .into_iter()
        .map(|tx| {
            Ok(Transaction {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                value: wei_to_native(&tx.value)?,
                timestamp,
                block_number: number,
            })
        })
        .collect::<Result<Vec<_>, RpcError>>()?;

    Ok(Block {
        number,
        hash: raw.hash,
        parent_hash: raw.parent_hash,
        timestamp,
        transactions,
    })
}

fn parse_timestamp(hex_str: &str) -> Result<DateTime<Utc>, RpcError> {
    let seconds = parse_hex_to_u64(hex_str)?;
    Utc.timestamp_opt(seconds as i64, 0)
        .single()
        .ok_or_else(|| RpcError::InvalidResponse(format!("Timestamp out of range: {}", hex_str)))
}

pub(crate) fn parse_hex_to_u64(hex_str: &str) -> Result<u64, RpcError> {
    let hex_without_prefix = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u64::from_str_radix(hex_without_prefix, 16).map_err(|e| {
        RpcError::InvalidResponse(format!("Failed to parse hex '{}' to u64: {}", hex_str, e))
    })
}

/// Convert a hex wei quantity into the chain's native unit
pub(crate) fn wei_to_native(hex_str: &str) -> Result<f64, RpcError> {
    let hex_without_prefix = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if hex_without_prefix.is_empty() {
        return Ok(0.0);
    }
    let wei = u128::from_str_radix(hex_without_prefix, 16).map_err(|e| {
        RpcError::InvalidResponse(format!("Failed to parse value '{}': {}", hex_str, e))
    })?;
    Ok(wei as f64 / WEI_PER_NATIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_client_creation() {
        let endpoint = "https://polygon-rpc.com/".to_string();
        let client = RpcClient::new(endpoint.clone());
        assert_eq!(client.endpoint(), endpoint);
        assert_eq!(client.timeout_seconds, 30);
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "eth_blockNumber".to_string(),
            params: vec![],
            id: 1,
        };

        let serialized = serde_json::to_string(&request).unwrap();
        let expected = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_json_rpc_response_deserialization_error() {
        let response_json = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        let response: JsonRpcResponse = serde_json::from_str(response_json).unwrap();

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_parse_hex_to_u64() {
        assert_eq!(parse_hex_to_u64("0x1234").unwrap(), 0x1234u64);
        assert_eq!(parse_hex_to_u64("1234").unwrap(), 0x1234u64);
        assert_eq!(parse_hex_to_u64("0x0").unwrap(), 0u64);
        assert!(matches!(parse_hex_to_u64("invalid"), Err(RpcError::InvalidResponse(_))));
    }

    #[test]
    fn test_wei_to_native() {
        assert_eq!(wei_to_native("0x0").unwrap(), 0.0);
        assert_eq!(wei_to_native("0x").unwrap(), 0.0);
        // 1.5 * 10^18
        assert_eq!(wei_to_native("0x14d1120d7b160000").unwrap(), 1.5);
        assert!(wei_to_native("0xzz").is_err());
    }

    #[test]
    fn test_convert_block_keeps_transaction_order() {
        let raw: RawBlock = serde_json::from_value(json!({
            "number": "0x10",
            "hash": "0xblock",
            "parentHash": "0xparent",
            "timestamp": "0x61cf9980",
            "transactions": [
                {"hash": "0x01", "from": "0xa", "to": "0xb", "value": "0xde0b6b3a7640000"},
                {"hash": "0x02", "from": "0xb", "to": null, "value": "0x0"}
            ]
        }))
        .unwrap();

        let block = convert_block(raw).unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.parent_hash, "0xparent");
        assert_eq!(block.timestamp.timestamp(), 1640995200);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].hash, "0x01");
        assert_eq!(block.transactions[0].value, 1.0);
        assert_eq!(block.transactions[0].block_number, 16);
        assert!(block.transactions[1].is_contract_creation());
    }
}

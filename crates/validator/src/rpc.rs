// Path: crates/validator/src/rpc.rs

//! A minimal JSON-RPC client for the coordinator/consensus chain.
//!
//! Covers exactly the surface `sigil-api::chain::ChainRpc` names. Rate
//! limiting (HTTP 429 and EIP-1474 `-32005`) is classified so the watcher's
//! backoff and the submitter's stop-tick handling can react.

use alloy_primitives::{Address, Bloom, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sigil_api::chain::{BlockTag, ChainRpc, LogFilter};
use sigil_types::chain::{BlockRef, FeeEstimate, LogEntry, RawTransaction};
use sigil_types::error::ChainError;

/// A JSON-RPC endpoint speaking the standard Ethereum namespace.
pub struct JsonRpcChain {
    url: String,
    client: reqwest::Client,
}

impl JsonRpcChain {
    /// Builds a client for the endpoint.
    pub fn new(url: String) -> Self {
        JsonRpcChain { url, client: reqwest::Client::new() }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(ChainError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ChainError::Transport(format!("http {}", response.status())));
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        match envelope {
            RpcEnvelope { error: Some(error), .. } => {
                Err(ChainError::from_json_rpc(error.code, &error.message))
            }
            RpcEnvelope { result: Some(result), .. } => Ok(result),
            _ => Err(ChainError::Decode("response carried neither result nor error".into())),
        }
    }
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: B256,
    parent_hash: B256,
    logs_bloom: Bloom,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: String,
    block_number: String,
    block_hash: B256,
    log_index: String,
}

fn parse_quantity(hex_quantity: &str) -> Result<u64, ChainError> {
    let digits = hex_quantity.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {hex_quantity}: {e}")))
}

fn parse_wide_quantity(hex_quantity: &str) -> Result<u128, ChainError> {
    let digits = hex_quantity.trim_start_matches("0x");
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {hex_quantity}: {e}")))
}

fn to_block_ref(block: RpcBlock) -> Result<BlockRef, ChainError> {
    Ok(BlockRef {
        number: parse_quantity(&block.number)?,
        hash: block.hash,
        parent_hash: block.parent_hash,
        logs_bloom: block.logs_bloom,
    })
}

fn to_log_entry(log: RpcLog) -> Result<LogEntry, ChainError> {
    let data = hex::decode(log.data.trim_start_matches("0x"))
        .map_err(|e| ChainError::Decode(format!("bad log data: {e}")))?;
    Ok(LogEntry {
        address: log.address,
        topics: log.topics,
        data,
        block_number: parse_quantity(&log.block_number)?,
        block_hash: log.block_hash,
        log_index: parse_quantity(&log.log_index)?,
    })
}

fn filter_value(filter: &LogFilter) -> Value {
    let mut object = serde_json::Map::new();
    if let Some(from) = filter.from_block {
        object.insert("fromBlock".into(), json!(format!("0x{from:x}")));
    }
    if let Some(to) = filter.to_block {
        object.insert("toBlock".into(), json!(format!("0x{to:x}")));
    }
    if !filter.addresses.is_empty() {
        object.insert("address".into(), json!(filter.addresses));
    }
    if !filter.topic0.is_empty() {
        object.insert("topics".into(), json!([filter.topic0]));
    }
    Value::Object(object)
}

#[async_trait]
impl ChainRpc for JsonRpcChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let number: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&number)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockRef>, ChainError> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!([format!("0x{number:x}"), false]))
            .await?;
        block.map(to_block_ref).transpose()
    }

    async fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRef>, ChainError> {
        let block: Option<RpcBlock> =
            self.call("eth_getBlockByHash", json!([hash, false])).await?;
        block.map(to_block_ref).transpose()
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter_value(filter)])).await?;
        logs.into_iter().map(to_log_entry).collect()
    }

    async fn logs_by_block_hash(
        &self,
        hash: B256,
        filter: &LogFilter,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let mut value = filter_value(filter);
        if let Value::Object(object) = &mut value {
            object.insert("blockHash".into(), json!(hash));
        }
        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([value])).await?;
        logs.into_iter().map(to_log_entry).collect()
    }

    async fn transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ChainError> {
        let tag = match tag {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        };
        let count: String =
            self.call("eth_getTransactionCount", json!([address, tag])).await?;
        parse_quantity(&count)
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate, ChainError> {
        let gas_price: String = self.call("eth_gasPrice", json!([])).await?;
        let priority: String = self.call("eth_maxPriorityFeePerGas", json!([])).await?;
        Ok(FeeEstimate {
            max_fee_per_gas: parse_wide_quantity(&gas_price)?,
            max_priority_fee_per_gas: parse_wide_quantity(&priority)?,
        })
    }

    async fn send_raw_transaction(&self, tx: &RawTransaction) -> Result<B256, ChainError> {
        self.call(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(&tx.0))]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x2a").unwrap(), 42);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn filter_includes_only_set_fields() {
        let value = filter_value(&LogFilter {
            from_block: Some(16),
            to_block: None,
            addresses: vec![],
            topic0: vec![],
        });
        assert_eq!(value, json!({ "fromBlock": "0x10" }));
    }
}

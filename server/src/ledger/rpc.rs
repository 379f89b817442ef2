use alloy_primitives::Bytes;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::contract;
use super::{Ledger, LedgerError};
use crate::config::ServerConfig;
use crate::models::{Address, OracleRequest, StatusCode, SubmissionOutcome};

const RECEIPT_POLL_INTERVAL_MS: u64 = 250;

/// Ethereum JSON-RPC 2.0 over HTTP
pub struct EthRpcClient {
    url: String,
    http: Client,
    next_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        parse_rpc_response(response)
    }
}

fn parse_rpc_response(mut response: Value) -> Result<Value, LedgerError> {
    if let Some(error) = response.get("error") {
        return Err(LedgerError::Rpc {
            code: error.pointer("/code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .pointer("/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| LedgerError::Malformed("missing result in RPC response".to_string()))
}

/// Client for the deployed FlightSuretyApp contract.
///
/// Transactions are sent with `eth_sendTransaction`, so oracle accounts must
/// be unlocked on the node (as on a ganache development chain).
pub struct LedgerClient {
    rpc: EthRpcClient,
    app_address: Address,
    gas_limit: u64,
    submission_timeout: Duration,
}

impl LedgerClient {
    pub fn new(config: &ServerConfig) -> Result<Self, LedgerError> {
        Ok(Self {
            rpc: EthRpcClient::new(config.ledger.url.clone(), config.submission_timeout)?,
            app_address: config.ledger.app_address,
            gas_limit: config.gas_limit,
            submission_timeout: config.submission_timeout,
        })
    }

    pub async fn is_operational(&self) -> Result<bool, LedgerError> {
        let data = self
            .call_contract(None, contract::is_operational())
            .await?;
        Ok(contract::decode_is_operational(&data)?)
    }

    async fn call_contract(
        &self,
        from: Option<Address>,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, LedgerError> {
        let mut call = json!({
            "to": self.app_address,
            "data": Bytes::from(data),
        });
        if let Some(from) = from {
            call["from"] = json!(from);
        }

        let result = self.rpc.call("eth_call", json!([call, "latest"])).await?;
        let encoded: Bytes = serde_json::from_value(result)
            .map_err(|e| LedgerError::Malformed(format!("eth_call result: {e}")))?;
        Ok(encoded.into())
    }

    async fn send_transaction(
        &self,
        from: Address,
        data: Vec<u8>,
        value_wei: u128,
    ) -> Result<String, LedgerError> {
        let tx = json!({
            "from": from,
            "to": self.app_address,
            "gas": format!("{:#x}", self.gas_limit),
            "value": format!("{:#x}", value_wei),
            "data": Bytes::from(data),
        });

        let result = self.rpc.call("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| LedgerError::Malformed("transaction hash is not a string".to_string()))
    }

    /// Poll until the transaction is mined. Callers bound this with a timeout.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), LedgerError> {
        loop {
            let receipt = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                return receipt_status(tx_hash, &receipt);
            }
            sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
    }

    async fn transact(
        &self,
        from: Address,
        data: Vec<u8>,
        value_wei: u128,
    ) -> Result<(), LedgerError> {
        timeout(
            self.submission_timeout,
            self.send_and_confirm(from, data, value_wei),
        )
        .await
        .map_err(|_| LedgerError::Timeout(self.submission_timeout))?
    }

    async fn send_and_confirm(
        &self,
        from: Address,
        data: Vec<u8>,
        value_wei: u128,
    ) -> Result<(), LedgerError> {
        let tx_hash = self.send_transaction(from, data, value_wei).await?;
        debug!(%tx_hash, %from, "transaction sent");
        self.wait_for_receipt(&tx_hash).await
    }
}

/// Receipts without a `status` field predate Byzantium and count as success.
fn receipt_status(tx_hash: &str, receipt: &Value) -> Result<(), LedgerError> {
    match receipt.pointer("/status").and_then(Value::as_str) {
        Some("0x0") => Err(LedgerError::Reverted {
            tx_hash: tx_hash.to_string(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn submit_response(
        &self,
        account: Address,
        index: u8,
        request: &OracleRequest,
        code: StatusCode,
    ) -> SubmissionOutcome {
        let data = contract::submit_oracle_response(index, request, code);
        match self.transact(account, data, 0).await {
            Ok(()) => SubmissionOutcome::Accepted,
            Err(e) => e.into_outcome(),
        }
    }

    async fn list_registered_accounts(&self) -> Result<Vec<Address>, LedgerError> {
        let result = self.rpc.call("eth_accounts", json!([])).await?;
        let accounts = result
            .as_array()
            .ok_or_else(|| LedgerError::Malformed("eth_accounts result is not an array".to_string()))?;

        accounts
            .iter()
            .map(|account| {
                account
                    .as_str()
                    .ok_or_else(|| LedgerError::Malformed("account is not a string".to_string()))?
                    .parse::<Address>()
                    .map_err(|e| LedgerError::Malformed(e.to_string()))
            })
            .collect()
    }

    async fn oracle_indexes(&self, account: Address) -> Result<[u8; 3], LedgerError> {
        let data = self
            .call_contract(Some(account), contract::get_my_indexes())
            .await?;
        Ok(contract::decode_my_indexes(&data)?)
    }

    async fn register_oracle(&self, account: Address, fee_wei: u128) -> Result<(), LedgerError> {
        self.transact(account, contract::register_oracle(), fee_wei)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_object_is_surfaced() {
        let err = parse_rpc_response(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": { "code": -32000, "message": "revert Flight or timestamp do not match oracle request" }
        }))
        .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32000, ref message } if message.contains("do not match")));
    }

    #[test]
    fn result_is_extracted() {
        let result = parse_rpc_response(json!({ "jsonrpc": "2.0", "id": 1, "result": ["0x01"] })).unwrap();
        assert_eq!(result, json!(["0x01"]));
    }

    #[test]
    fn missing_result_is_malformed() {
        let err = parse_rpc_response(json!({ "jsonrpc": "2.0", "id": 1 })).unwrap_err();
        assert!(matches!(err, LedgerError::Malformed(_)));
    }

    #[test]
    fn receipt_status_maps_to_outcome() {
        assert!(receipt_status("0x1", &json!({ "status": "0x1" })).is_ok());
        assert!(receipt_status("0x1", &json!({ "blockNumber": "0x10" })).is_ok());
        let err = receipt_status("0xdead", &json!({ "status": "0x0" })).unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { ref tx_hash } if tx_hash == "0xdead"));
    }
}

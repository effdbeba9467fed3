use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use crate::address::EthAddress;

/// JSON-RPC client for the configured chain endpoint.
///
/// Every call shares one bounded request timeout; a timed-out call surfaces
/// as a plain error for the issuer to classify, never as success-pending.
#[derive(Clone)]
pub struct ChainClient {
    inner: HttpClient,
    timeout: Duration,
}

impl ChainClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout >= Duration::from_millis(100),
            "Timeout invariant broken"
        );
        self.timeout
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let response: String = self
            .inner
            .request("eth_chainId", rpc_params![])
            .await
            .context("RPC call eth_chainId failed")?;
        parse_quantity(&response).context("eth_chainId returned a malformed quantity")
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let response: String = self
            .inner
            .request("eth_gasPrice", rpc_params![])
            .await
            .context("RPC call eth_gasPrice failed")?;
        let price =
            parse_quantity_wide(&response).context("eth_gasPrice returned a malformed quantity")?;
        assert!(price > 0, "Gas price of zero fails sanity check");
        Ok(price)
    }

    /// Pending-state transaction count so queued submissions are counted.
    pub async fn transaction_count(&self, address: &EthAddress) -> Result<u64> {
        let response: String = self
            .inner
            .request(
                "eth_getTransactionCount",
                rpc_params![address.to_checksummed(), "pending"],
            )
            .await
            .context("RPC call eth_getTransactionCount failed")?;
        parse_quantity(&response).context("eth_getTransactionCount returned a malformed quantity")
    }

    pub async fn balance(&self, address: &EthAddress) -> Result<u128> {
        let response: String = self
            .inner
            .request(
                "eth_getBalance",
                rpc_params![address.to_checksummed(), "latest"],
            )
            .await
            .context("RPC call eth_getBalance failed")?;
        parse_quantity_wide(&response).context("eth_getBalance returned a malformed quantity")
    }

    /// Submits a raw signed transaction; returns the transaction hash the
    /// endpoint assigned. Acceptance here means "accepted for broadcast",
    /// not confirmed.
    pub async fn send_raw_transaction(&self, raw_tx_hex: &str) -> Result<String> {
        assert!(
            raw_tx_hex.starts_with("0x"),
            "Raw transaction must be 0x-prefixed hex"
        );
        let response: String = self
            .inner
            .request("eth_sendRawTransaction", rpc_params![raw_tx_hex])
            .await
            .context("RPC call eth_sendRawTransaction failed")?;
        if !response.starts_with("0x") || response.len() != 66 {
            return Err(anyhow!(
                "eth_sendRawTransaction returned a malformed hash: {response}"
            ));
        }
        Ok(response)
    }
}

fn parse_quantity(value: &str) -> Result<u64> {
    let stripped = value
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity missing 0x prefix: {value}"))?;
    u64::from_str_radix(stripped, 16).with_context(|| format!("invalid hex quantity: {value}"))
}

fn parse_quantity_wide(value: &str) -> Result<u128> {
    let stripped = value
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity missing 0x prefix: {value}"))?;
    u128::from_str_radix(stripped, 16).with_context(|| format!("invalid hex quantity: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_timeout_is_reported() {
        // Building the client performs no I/O, so a dead endpoint is fine.
        let timeout = Duration::from_millis(2_500);
        let client = ChainClient::new("http://127.0.0.1:1", timeout).expect("client builds");
        assert_eq!(client.timeout(), timeout);
    }

    #[test]
    fn quantities_parse_from_rpc_hex() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0xaa36a7").unwrap(), 11_155_111);
        assert_eq!(parse_quantity_wide("0x3b9aca00").unwrap(), 1_000_000_000);
        assert!(parse_quantity("aa36a7").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }
}

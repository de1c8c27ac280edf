//! Ledger connection configuration.

use serde::{Deserialize, Serialize};

/// Everything the recorder needs to talk to a ledger node. Defaults match
/// a stock local Ganache development chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Human-readable network name carried into verification records.
    pub network: String,
    /// JSON-RPC HTTP endpoint.
    pub rpc_endpoint: String,
    /// Expected chain id; a live node reporting a different id is fatal.
    pub chain_id: u64,
    /// Hash-storage contract address.
    pub contract_address: String,
    /// Account the submission transaction is sent from.
    pub sender: String,
    /// Account the nominal transfer is addressed to.
    pub recipient: String,
    /// Submitting key (consumed by the node; never logged).
    pub private_key: String,
    pub gas_limit: u64,
    pub gas_price_wei: u64,
    /// Receipt polling budget, one probe per second.
    pub confirmation_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: "ganache-local".into(),
            rpc_endpoint: "http://127.0.0.1:8545".into(),
            chain_id: 1337,
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            sender: "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1".into(),
            recipient: "0xffcf8fdee72ac11b5c542428b35eef5769c409f0".into(),
            private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .into(),
            gas_limit: 90_000,
            gas_price_wei: 1_000_000_000,
            confirmation_timeout_secs: 30,
        }
    }
}

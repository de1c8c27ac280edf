//! The integrity recorder.
//!
//! Lifecycle: `connect` probes the node with `eth_chainId`. An
//! unreachable endpoint puts the recorder into offline mode, where every
//! verification is a local-only attestation; a reachable node reporting
//! the wrong chain id is a fatal configuration error. Online
//! verification submits the artifact hash as transaction data and polls
//! for the receipt once per second within the configured budget.

use crate::config::LedgerConfig;
use crate::hash;
use crate::rpc::{decode_hex_u64, RpcClient};
use crate::LedgerError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Outcome of one artifact verification, serializable as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verified: bool,
    /// `0x`-prefixed SHA-256 of the artifact.
    pub hash: String,
    /// Ledger transaction id, or `offline_…` for local-only attestations.
    pub transaction_id: String,
    pub network: String,
    pub block_number: u64,
    /// Unix seconds at verification time.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug)]
pub struct IntegrityRecorder {
    config: LedgerConfig,
    /// `None` once the recorder has degraded to offline mode.
    rpc: Option<RpcClient>,
    cache: HashMap<String, VerificationRecord>,
    rng: StdRng,
}

impl IntegrityRecorder {
    /// Probes the node and builds an online or offline recorder. A live
    /// node on the wrong chain is a hard error; an unreachable node is
    /// not.
    pub async fn connect(config: LedgerConfig) -> Result<Self, LedgerError> {
        let rpc = RpcClient::new(config.rpc_endpoint.clone())?;
        match rpc.call("eth_chainId", json!([])).await {
            Ok(result) => {
                let actual = decode_hex_u64(&result)?;
                if actual != config.chain_id {
                    return Err(LedgerError::ChainIdMismatch {
                        expected: config.chain_id,
                        actual,
                    });
                }
                info!(
                    "connected to {} (chain id {actual}) at {}",
                    config.network, config.rpc_endpoint
                );
                Ok(Self::with_rpc(config, Some(rpc)))
            }
            Err(e) => {
                warn!(
                    "ledger unreachable at {}, continuing offline: {e}",
                    config.rpc_endpoint
                );
                Ok(Self::with_rpc(config, None))
            }
        }
    }

    /// A recorder that never talks to the network.
    pub fn offline(config: LedgerConfig) -> Self {
        Self::with_rpc(config, None)
    }

    fn with_rpc(config: LedgerConfig, rpc: Option<RpcClient>) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            config,
            rpc,
            cache: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_online(&self) -> bool {
        self.rpc.is_some()
    }

    /// Hashes the artifact and records the digest on the ledger (or
    /// locally when offline). Successful verdicts are cached by hash.
    pub async fn verify_binary(&mut self, path: &Path) -> VerificationRecord {
        let timestamp = unix_now();
        let hash = match hash::hash_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                return VerificationRecord {
                    verified: false,
                    hash: String::new(),
                    transaction_id: String::new(),
                    network: self.config.network.clone(),
                    block_number: 0,
                    timestamp,
                    error_message: Some(format!("failed to hash artifact: {e}")),
                }
            }
        };
        if let Some(existing) = self.cache.get(&hash) {
            debug!("verification cache hit for {hash}");
            return existing.clone();
        }

        let mut record = VerificationRecord {
            verified: false,
            hash,
            transaction_id: String::new(),
            network: self.config.network.clone(),
            block_number: 0,
            timestamp,
            error_message: None,
        };

        match &self.rpc {
            Some(rpc) => {
                info!("submitting {} to {}", record.hash, self.config.network);
                match submit_hash(rpc, &self.config, &record.hash).await {
                    Ok((transaction_id, block_number)) => {
                        info!("verification recorded in tx {transaction_id}");
                        record.transaction_id = transaction_id;
                        record.block_number = block_number;
                        record.verified = true;
                    }
                    Err(e) => {
                        warn!("ledger submission failed: {e}");
                        record.error_message = Some(e.to_string());
                    }
                }
            }
            None => {
                record.transaction_id = format!("offline_{}", random_txid(&mut self.rng));
                record.block_number = 12_345_678 + self.cache.len() as u64;
                record.verified = true;
                info!("offline attestation {}", record.transaction_id);
            }
        }

        if record.verified {
            self.cache.insert(record.hash.clone(), record.clone());
        }
        record
    }

    /// Re-hashes the artifact and compares against `expected`. Mismatch
    /// is a clean `false`, not an error.
    pub fn validate_integrity(&self, path: &Path, expected: &str) -> bool {
        match hash::hash_file(path) {
            Ok(actual) => {
                let valid = actual == expected;
                info!(
                    "integrity validation {}",
                    if valid { "passed" } else { "failed" }
                );
                valid
            }
            Err(e) => {
                warn!("integrity validation could not hash artifact: {e}");
                false
            }
        }
    }

    /// Cached verification records for a hash.
    pub fn verification_history(&self, hash: &str) -> Vec<VerificationRecord> {
        self.cache.get(hash).cloned().into_iter().collect()
    }

    /// Human-readable connection summary.
    pub fn network_status(&self) -> String {
        format!(
            "network: {}\nconnected: {}\nrpc endpoint: {}\ncontract: {}\ncached verifications: {}",
            self.config.network,
            if self.is_online() { "yes" } else { "no" },
            self.config.rpc_endpoint,
            self.config.contract_address,
            self.cache.len()
        )
    }
}

/// Sends the hash-bearing transaction and waits for its receipt.
/// Returns the transaction id and the including block number.
async fn submit_hash(
    rpc: &RpcClient,
    config: &LedgerConfig,
    hash: &str,
) -> Result<(String, u64), LedgerError> {
    let params = json!([{
        "from": config.sender,
        "to": config.recipient,
        "value": "0x1",
        "gas": format!("{:#x}", config.gas_limit),
        "gasPrice": format!("{:#x}", config.gas_price_wei),
        "data": hash,
    }]);
    let result = rpc.call("eth_sendTransaction", params).await?;
    let transaction_id = result
        .as_str()
        .ok_or_else(|| LedgerError::Response(format!("expected tx hash, got {result}")))?
        .to_string();
    debug!("transaction submitted: {transaction_id}");

    let block_number = wait_for_confirmation(rpc, &transaction_id, config).await?;
    Ok((transaction_id, block_number))
}

/// Polls for a receipt once per second within the configured budget.
async fn wait_for_confirmation(
    rpc: &RpcClient,
    transaction_id: &str,
    config: &LedgerConfig,
) -> Result<u64, LedgerError> {
    let budget = config.confirmation_timeout_secs;
    for attempt in 0..budget {
        let receipt = rpc
            .call("eth_getTransactionReceipt", json!([transaction_id]))
            .await?;
        if !receipt.is_null() {
            match receipt.get("status").and_then(Value::as_str) {
                Some("0x1") => {
                    let block_number = receipt
                        .get("blockNumber")
                        .map(decode_hex_u64)
                        .transpose()?
                        .unwrap_or(0);
                    return Ok(block_number);
                }
                Some("0x0") => return Err(LedgerError::TransactionFailed),
                _ => {}
            }
        }
        debug!("waiting for confirmation ({}/{budget})", attempt + 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err(LedgerError::ConfirmationTimeout(budget))
}

fn random_txid(rng: &mut StdRng) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..64)
        .map(|_| HEX[rng.random_range(0..HEX.len())] as char)
        .collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn artifact(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn offline_mode_attests_locally() {
        let mut recorder = IntegrityRecorder::offline(LedgerConfig::default());
        let file = artifact(b"hello world!\n");
        let record = recorder.verify_binary(file.path()).await;

        assert!(record.verified);
        assert!(record.transaction_id.starts_with("offline_"));
        assert_eq!(record.network, "ganache-local");
        assert_eq!(
            record.hash,
            "0xecf701f727d9e2d77c4aa49ac6fbbcc997278aca010bddeeb961c10cf54d435a"
        );
    }

    #[tokio::test]
    async fn repeated_verification_hits_the_cache() {
        let mut recorder = IntegrityRecorder::offline(LedgerConfig::default());
        let file = artifact(b"artifact");
        let first = recorder.verify_binary(file.path()).await;
        let second = recorder.verify_binary(file.path()).await;
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(recorder.verification_history(&first.hash).len(), 1);
    }

    #[tokio::test]
    async fn integrity_round_trip_and_corruption() {
        let recorder = IntegrityRecorder::offline(LedgerConfig::default());
        let file = artifact(b"hello world!\n");
        let hash = hash::hash_file(file.path()).unwrap();
        assert!(recorder.validate_integrity(file.path(), &hash));

        let corrupted = artifact(b"hello world?\n");
        assert!(!recorder.validate_integrity(corrupted.path(), &hash));
    }

    #[tokio::test]
    async fn missing_artifact_reports_an_error() {
        let mut recorder = IntegrityRecorder::offline(LedgerConfig::default());
        let record = recorder
            .verify_binary(Path::new("/nonexistent/artifact.bin"))
            .await;
        assert!(!record.verified);
        assert!(record.error_message.is_some());
    }
}

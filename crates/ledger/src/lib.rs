//! Artifact integrity recording.
//!
//! Hashes an emitted artifact with SHA-256, commits the digest to an
//! Ethereum-style ledger through JSON-RPC 2.0 over HTTP, polls for the
//! transaction receipt, and caches the verdict. When the ledger is
//! unreachable at startup the recorder degrades to offline mode and
//! issues local-only attestations with an `offline_` transaction id.

pub mod config;
pub mod hash;
pub mod recorder;
pub mod rpc;

pub use config::LedgerConfig;
pub use hash::{hash_bytes, hash_file};
pub use recorder::{IntegrityRecorder, VerificationRecord};
pub use rpc::RpcClient;

/// Main error type for ledger operations.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("RPC transport failure: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger RPC error: {0}")]
    Rpc(String),

    #[error("malformed RPC response: {0}")]
    Response(String),

    #[error("chain id mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("transaction failed on the ledger")]
    TransactionFailed,

    #[error("no receipt within {0} seconds")]
    ConfirmationTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! Integrity recorder against a scripted ledger node.
//!
//! A minimal HTTP responder plays the node: it answers `eth_chainId`,
//! `eth_sendTransaction` and `eth_getTransactionReceipt` from a canned
//! script, closing each connection so the client never reuses sockets.

use color_eyre::Result;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use umbra_ledger::{hash_file, IntegrityRecorder, LedgerConfig, LedgerError};

const TX_HASH: &str = "0x6a5f1c3e8b2d94707f1be7aa63d5ac1db5cbe15f7a9c02ee34d8f2b35d9a4c01";

#[derive(Clone, Copy)]
struct MockNode {
    chain_id: u64,
    /// Number of receipt polls answered with `null` before the final one.
    receipt_delay: usize,
    /// `0x1` for success, `0x0` for an on-chain failure.
    receipt_status: &'static str,
}

impl MockNode {
    /// Spawns the responder and returns its endpoint URL.
    async fn spawn(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let polls = Arc::new(AtomicUsize::new(0));
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let polls = polls.clone();
                let node = self;
                tokio::spawn(async move {
                    if let Some(body) = read_request(&mut socket).await {
                        let response = node.respond(&body, &polls);
                        let payload = response.to_string();
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            payload.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(payload.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                });
            }
        });
        endpoint
    }

    fn respond(&self, request: &Value, polls: &AtomicUsize) -> Value {
        let id = request.get("id").cloned().unwrap_or(json!(1));
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");
        let result = match method {
            "eth_chainId" => json!(format!("{:#x}", self.chain_id)),
            "eth_sendTransaction" => json!(TX_HASH),
            "eth_getTransactionReceipt" => {
                let seen = polls.fetch_add(1, Ordering::SeqCst);
                if seen < self.receipt_delay {
                    Value::Null
                } else {
                    json!({
                        "transactionHash": TX_HASH,
                        "status": self.receipt_status,
                        "blockNumber": "0x10",
                    })
                }
            }
            _ => Value::Null,
        };
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }
}

/// Reads one HTTP request and returns its JSON body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Value> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(split) = find_header_end(&buf) {
            let headers = String::from_utf8_lossy(&buf[..split]).to_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())?;
            while buf.len() < split + 4 + content_length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = &buf[split + 4..split + 4 + content_length];
            return serde_json::from_slice(body).ok();
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn config_for(endpoint: &str) -> LedgerConfig {
    LedgerConfig {
        rpc_endpoint: endpoint.to_string(),
        confirmation_timeout_secs: 5,
        ..LedgerConfig::default()
    }
}

fn artifact(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn records_a_hash_on_the_ledger() -> Result<()> {
    let endpoint = MockNode {
        chain_id: 1337,
        receipt_delay: 1,
        receipt_status: "0x1",
    }
    .spawn()
    .await;

    let mut recorder = IntegrityRecorder::connect(config_for(&endpoint)).await?;
    assert!(recorder.is_online());

    let file = artifact(b"hello world!\n");
    let record = recorder.verify_binary(file.path()).await;
    assert!(record.verified, "{:?}", record.error_message);
    assert_eq!(record.transaction_id, TX_HASH);
    assert_eq!(record.block_number, 16);
    assert_eq!(
        record.hash,
        "0xecf701f727d9e2d77c4aa49ac6fbbcc997278aca010bddeeb961c10cf54d435a"
    );

    // second run is answered from the cache, no further transactions
    let again = recorder.verify_binary(file.path()).await;
    assert_eq!(again.transaction_id, record.transaction_id);
    Ok(())
}

#[tokio::test]
async fn on_chain_failure_is_reported_not_retried() {
    let endpoint = MockNode {
        chain_id: 1337,
        receipt_delay: 0,
        receipt_status: "0x0",
    }
    .spawn()
    .await;

    let mut recorder = IntegrityRecorder::connect(config_for(&endpoint)).await.unwrap();
    let file = artifact(b"doomed artifact");
    let record = recorder.verify_binary(file.path()).await;
    assert!(!record.verified);
    assert!(record.error_message.is_some());
}

#[tokio::test]
async fn wrong_chain_id_is_fatal() {
    let endpoint = MockNode {
        chain_id: 999,
        receipt_delay: 0,
        receipt_status: "0x1",
    }
    .spawn()
    .await;

    let err = IntegrityRecorder::connect(config_for(&endpoint))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::ChainIdMismatch {
            expected: 1337,
            actual: 999
        }
    ));
}

#[tokio::test]
async fn unreachable_node_degrades_to_offline() {
    // nothing listens on the discard port
    let config = config_for("http://127.0.0.1:9");
    let mut recorder = IntegrityRecorder::connect(config).await.unwrap();
    assert!(!recorder.is_online());

    let file = artifact(b"hello world!\n");
    let record = recorder.verify_binary(file.path()).await;
    assert!(record.verified);
    assert!(record.transaction_id.starts_with("offline_"));
    assert_eq!(record.network, "ganache-local");
}

#[tokio::test]
async fn validate_integrity_round_trips() {
    let recorder = IntegrityRecorder::offline(LedgerConfig::default());
    let file = artifact(b"protected binary");
    let hash = hash_file(file.path()).unwrap();
    assert!(recorder.validate_integrity(file.path(), &hash));

    let tampered = artifact(b"protected binarY");
    assert!(!recorder.validate_integrity(tampered.path(), &hash));
}

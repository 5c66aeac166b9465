//! Persistence capability (spec.md §6.2): an optional sink for completed
//! trades, reconciliation passes, and raw events. Failures are non-fatal —
//! a trade that fails to persist is logged and the system continues, it is
//! never blocked on disk I/O.
//!
//! Grounded in the teacher's `execution/journal.rs` `AsyncJournal`: a
//! background writer owns the file handle and the rest of the system only
//! ever sends it owned values. The teacher uses a `crossbeam` channel and a
//! dedicated `std::thread`; here the writer is a `tokio::task` fed by a
//! bounded `tokio::sync::mpsc` channel, matching the rest of the crate's
//! async runtime instead of spinning up a non-tokio thread.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// A completed round trip: one filled buy matched with one filled sell on
/// the same slot (spec.md §6.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub fees: Decimal,
    pub pnl: Decimal,
    pub ts_millis: i64,
}

/// One reconciliation pass (SPEC_FULL §4.5 addition: persisted every pass,
/// not only when a divergence is found, so operators can audit reconciler
/// cadence after the fact).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationRecord {
    pub symbol: String,
    pub divergences_found: u32,
    pub divergences_repaired: u32,
    pub ts_millis: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
enum StorageEvent {
    Trade(TradeRecord),
    Reconciliation(ReconciliationRecord),
    Event { name: String, payload: serde_json::Value },
}

/// Capability consumed by the Position Manager and Safety reconciler.
/// Implementations must not block the caller on slow or failed I/O.
#[async_trait]
pub trait TradeStorage: Send + Sync {
    async fn save_trade(&self, record: TradeRecord);
    async fn save_reconciliation(&self, record: ReconciliationRecord);
    async fn append_event(&self, kind: &str, payload: serde_json::Value);
}

/// No-op backend, the default when persistence isn't configured
/// (`persistence.enable_journal = false`).
pub struct NullTradeStorage;

#[async_trait]
impl TradeStorage for NullTradeStorage {
    async fn save_trade(&self, _record: TradeRecord) {}
    async fn save_reconciliation(&self, _record: ReconciliationRecord) {}
    async fn append_event(&self, _kind: &str, _payload: serde_json::Value) {}
}

/// Append-only newline-delimited JSON file, written from a single
/// background task so callers never wait on disk I/O.
pub struct JsonlTradeStorage {
    tx: mpsc::Sender<StorageEvent>,
}

impl JsonlTradeStorage {
    /// Spawns the writer task. Events submitted after the channel fills
    /// (4096 events, matching the teacher's journal buffer) are dropped
    /// with a logged error rather than applying backpressure to trading.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(path, rx));
        Self { tx }
    }

    fn record(&self, event: StorageEvent) {
        if let Err(e) = self.tx.try_send(event) {
            error!("trade storage buffer full or closed, dropping event: {}", e);
        }
    }
}

#[async_trait]
impl TradeStorage for JsonlTradeStorage {
    async fn save_trade(&self, record: TradeRecord) {
        self.record(StorageEvent::Trade(record));
    }

    async fn save_reconciliation(&self, record: ReconciliationRecord) {
        self.record(StorageEvent::Reconciliation(record));
    }

    async fn append_event(&self, kind: &str, payload: serde_json::Value) {
        self.record(StorageEvent::Event {
            name: kind.to_string(),
            payload,
        });
    }
}

async fn writer_loop(path: PathBuf, mut rx: mpsc::Receiver<StorageEvent>) {
    let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(f) => f,
        Err(e) => {
            error!("failed to open trade storage file {:?}: {}", path, e);
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    error!("failed to write trade storage event: {}", e);
                }
            }
            Err(e) => error!("failed to serialize trade storage event: {}", e),
        }
    }

    if let Err(e) = file.flush().await {
        error!("failed to flush trade storage file: {}", e);
    }
    info!("trade storage writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncReadExt;

    fn trade() -> TradeRecord {
        TradeRecord {
            symbol: "BTCUSDT".to_string(),
            entry_price: dec!(98),
            exit_price: dec!(100),
            quantity: dec!(0.3),
            fees: dec!(0.05),
            pnl: dec!(0.55),
            ts_millis: 1,
        }
    }

    #[tokio::test]
    async fn null_storage_accepts_everything_silently() {
        let storage = NullTradeStorage;
        storage.save_trade(trade()).await;
        storage
            .save_reconciliation(ReconciliationRecord {
                symbol: "BTCUSDT".to_string(),
                divergences_found: 0,
                divergences_repaired: 0,
                ts_millis: 1,
            })
            .await;
    }

    #[tokio::test]
    async fn jsonl_storage_writes_a_line_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let storage = JsonlTradeStorage::spawn(path.clone());

        storage.save_trade(trade()).await;
        storage.save_trade(trade()).await;

        // Give the writer task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut contents = String::new();
        tokio::fs::File::open(&path)
            .await
            .unwrap()
            .read_to_string(&mut contents)
            .await
            .unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"kind\":\"Trade\""));
    }
}

// src/logging/ledger.rs

use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::{self, Duration};
use tracing::{error, info, warn};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::LedgerError;
use crate::logging::auction_log::AuctionRecord;
use crate::model::auction::Auction;

/// Append-only sink for finished auctions. `record` must never block.
pub trait AuctionLedger: Send + Sync {
    fn record(&self, auction: &Auction) -> Result<(), LedgerError>;
}

enum LedgerMessage {
    Entry(String),
    Flush(oneshot::Sender<()>),
}

/// Writes one JSON line per auction into an hourly rolling file. Lines are
/// queued on a bounded channel and written in batches by a background task.
pub struct FileLedger {
    sender: Sender<LedgerMessage>,
}

impl FileLedger {
    /// - `buffer_size`: queued records before `record` reports backpressure
    /// - `batch_size`: records per disk write
    /// - `flush_interval`: milliseconds between forced writes
    /// - `retention_hours`: ledger files older than this are deleted
    pub fn new(
        log_dir: &str,
        file_prefix: &str,
        buffer_size: usize,
        batch_size: usize,
        flush_interval: u64,
        retention_hours: u64,
    ) -> std::io::Result<Arc<Self>> {
        std::fs::create_dir_all(log_dir)?;
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let log_file = Arc::new(rolling::hourly(log_dir, format!("{}.jsonl", file_prefix)));

        tokio::spawn(Self::background_writer(log_file, receiver, batch_size.max(1), flush_interval));
        {
            let log_dir = log_dir.to_string();
            let file_prefix = file_prefix.to_string();
            tokio::spawn(async move {
                let mut every_hour = time::interval(Duration::from_secs(3600));
                loop {
                    every_hour.tick().await;
                    cleanup_old_files(&log_dir, &file_prefix, retention_hours).await;
                }
            });
        }

        Ok(Arc::new(Self { sender }))
    }

    /// Resolves once everything queued before the call is on disk.
    pub async fn flush(&self) -> Result<(), LedgerError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Flush(done))
            .await
            .map_err(|_| LedgerError::Closed)?;
        wait.await.map_err(|_| LedgerError::Closed)
    }

    async fn background_writer(
        log_file: Arc<RollingFileAppender>,
        mut receiver: Receiver<LedgerMessage>,
        batch_size: usize,
        flush_interval: u64,
    ) {
        let mut buffer = Vec::with_capacity(batch_size);
        let mut interval = time::interval(Duration::from_millis(flush_interval.max(1)));

        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(LedgerMessage::Entry(line)) => {
                        buffer.push(line);
                        if buffer.len() >= batch_size {
                            Self::write_to_disk(log_file.clone(), &mut buffer).await;
                        }
                    }
                    Some(LedgerMessage::Flush(done)) => {
                        Self::write_to_disk(log_file.clone(), &mut buffer).await;
                        let _ = done.send(());
                    }
                    None => {
                        Self::write_to_disk(log_file.clone(), &mut buffer).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    Self::write_to_disk(log_file.clone(), &mut buffer).await;
                }
            }
        }
    }

    async fn write_to_disk(file: Arc<RollingFileAppender>, buffer: &mut Vec<String>) {
        if buffer.is_empty() {
            return;
        }
        let content = buffer.join("\n") + "\n";
        buffer.clear();

        let written = task::spawn_blocking(move || {
            let mut writer = file.make_writer();
            writer.write_all(content.as_bytes())
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "failed to write auction ledger"),
            Err(e) => error!(error = %e, "auction ledger writer task failed"),
        }
    }
}

impl AuctionLedger for FileLedger {
    fn record(&self, auction: &Auction) -> Result<(), LedgerError> {
        let line = serde_json::to_string(&AuctionRecord::from(auction))
            .map_err(|e| LedgerError::Encode(e.to_string()))?;
        self.sender
            .try_send(LedgerMessage::Entry(line))
            .map_err(|e| match e {
                TrySendError::Full(_) => LedgerError::Backpressure(auction.id.to_string()),
                TrySendError::Closed(_) => LedgerError::Closed,
            })
    }
}

async fn cleanup_old_files(log_dir: &str, file_prefix: &str, retention_hours: u64) {
    let retention = StdDuration::from_secs(retention_hours * 3600);
    let now = SystemTime::now();
    let mut dir = match tokio::fs::read_dir(log_dir).await {
        Ok(dir) => dir,
        Err(e) => {
            warn!(log_dir, error = %e, "failed to read ledger directory");
            return;
        }
    };
    while let Ok(Some(entry)) = dir.next_entry().await {
        let path = entry.path();
        let owned = Path::new(&path)
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with(file_prefix));
        if !owned {
            continue;
        }
        let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
            continue;
        };
        if now.duration_since(modified).unwrap_or_default() > retention {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(path = %path.display(), "deleted expired ledger file"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete ledger file"),
            }
        }
    }
}

/// Keeps records in memory; for embedding and tests.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<AuctionRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuctionRecord> {
        self.records.lock().clone()
    }
}

impl AuctionLedger for MemoryLedger {
    fn record(&self, auction: &Auction) -> Result<(), LedgerError> {
        self.records.lock().push(AuctionRecord::from(auction));
        Ok(())
    }
}

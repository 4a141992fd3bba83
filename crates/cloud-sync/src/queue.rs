//! Durable outbound queue
//!
//! Bounded in-memory FIFO while connected, append-only JSONL log otherwise.
//! The connection state and both stores sit behind one lock so that the
//! "connected?" check and the push are a single critical section.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dms::TelemetryPayload;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::CloudError;

/// In-memory FIFO capacity
pub const QUEUE_CAPACITY: usize = 1000;

/// Connection lifecycle as seen by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Handshaking,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Where a sent item ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// In memory, awaiting transmission
    Queued,
    /// Appended to the offline log
    Persisted,
    /// Offline log write failed; the error was logged
    Lost,
}

/// Queue counters since startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub dropped_overflow: u64,
    pub persisted: u64,
    pub delivered: u64,
}

/// Append-only JSONL file of payloads awaiting a connection
#[derive(Debug, Clone)]
pub struct OfflineLog {
    path: PathBuf,
}

impl OfflineLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one payload as one line
    pub fn append(&self, item: &TelemetryPayload) -> Result<(), CloudError> {
        let mut line = serde_json::to_string(item)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Read every parseable line in order, then delete the file
    pub fn drain(&self) -> Result<Vec<TelemetryPayload>, CloudError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Raw bytes: a torn write can leave half a multi-byte character
        let mut items = Vec::new();
        for (index, bytes) in BufReader::new(file).split(b'\n').enumerate() {
            let bytes = bytes?;
            let line = match std::str::from_utf8(&bytes) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Skipping undecodable offline log line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryPayload>(line) {
                Ok(item) => items.push(item),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed offline log line"),
            }
        }

        fs::remove_file(&self.path)?;
        Ok(items)
    }
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<TelemetryPayload>,
    state: ConnectionState,
    stats: QueueStats,
}

impl Inner {
    fn push_bounded(&mut self, item: TelemetryPayload, capacity: usize) {
        if self.items.len() >= capacity {
            self.items.pop_front();
            self.stats.dropped_overflow += 1;
            metrics::counter!("cloud_sync_dropped_overflow_total").increment(1);
            debug!(capacity, "Queue full, dropped oldest item");
        }
        self.items.push_back(item);
    }
}

/// Thread-safe queue shared by the frame path and the connection task
#[derive(Debug)]
pub struct DurableQueue {
    inner: Mutex<Inner>,
    log: OfflineLog,
    capacity: usize,
}

impl DurableQueue {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(log_path, QUEUE_CAPACITY)
    }

    pub fn with_capacity(log_path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            log: OfflineLog::new(log_path),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue while connected, otherwise persist to the offline log
    pub fn send(&self, item: TelemetryPayload) -> Delivery {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connected {
            inner.push_bounded(item, self.capacity);
            inner.stats.queued += 1;
            metrics::counter!("cloud_sync_queued_total").increment(1);
            metrics::gauge!("cloud_sync_queue_depth").set(inner.items.len() as f64);
            return Delivery::Queued;
        }

        match self.log.append(&item) {
            Ok(()) => {
                inner.stats.persisted += 1;
                metrics::counter!("cloud_sync_persisted_total").increment(1);
                Delivery::Persisted
            }
            Err(e) => {
                error!(path = %self.log.path().display(), error = %e, "Failed to persist telemetry");
                Delivery::Lost
            }
        }
    }

    /// Next item to transmit
    pub fn pop(&self) -> Option<TelemetryPayload> {
        let mut inner = self.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            metrics::gauge!("cloud_sync_queue_depth").set(inner.items.len() as f64);
        }
        item
    }

    pub fn mark_delivered(&self) {
        self.lock().stats.delivered += 1;
        metrics::counter!("cloud_sync_delivered_total").increment(1);
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    /// Handshake succeeded: restore the offline log, then accept sends in memory
    ///
    /// Returns how many items were restored. The state is CONNECTED even if
    /// the log could not be read; the file is then retried on the next
    /// reconnect.
    pub fn on_connected(&self) -> Result<usize, CloudError> {
        let mut inner = self.lock();
        inner.state = ConnectionState::Connected;

        let restored = self.log.drain()?;
        let count = restored.len();
        let pending = std::mem::take(&mut inner.items);
        for item in restored.into_iter().chain(pending) {
            inner.push_bounded(item, self.capacity);
        }
        metrics::gauge!("cloud_sync_queue_depth").set(inner.items.len() as f64);

        if count > 0 {
            info!(restored = count, queued = inner.items.len(), "Restored offline log");
        }
        Ok(count)
    }

    /// Leave CONNECTED: spill the in-flight item, then the FIFO, to disk in order
    ///
    /// Items that cannot be written stay in memory.
    pub fn on_disconnected(&self, in_flight: Option<TelemetryPayload>) -> usize {
        let mut inner = self.lock();
        inner.state = ConnectionState::Disconnected;

        if let Some(item) = in_flight {
            inner.items.push_front(item);
        }

        let mut spilled = 0;
        while let Some(item) = inner.items.front() {
            if let Err(e) = self.log.append(item) {
                error!(
                    remaining = inner.items.len(),
                    error = %e,
                    "Failed to spill queue to offline log"
                );
                break;
            }
            inner.items.pop_front();
            inner.stats.persisted += 1;
            spilled += 1;
        }

        if spilled > 0 {
            metrics::counter!("cloud_sync_persisted_total").increment(spilled as u64);
            debug!(spilled, "Spilled queue to offline log");
        }
        metrics::gauge!("cloud_sync_queue_depth").set(inner.items.len() as f64);
        spilled
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }

    pub fn log(&self) -> &OfflineLog {
        &self.log
    }

    /// Snapshot of queued items, oldest first
    pub fn snapshot(&self) -> Vec<TelemetryPayload> {
        self.lock().items.iter().cloned().collect()
    }
}

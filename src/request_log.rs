//! 请求日志审计 - 记录近期请求
//!
//! Bounded, newest-first ring buffer of per-request records, snapshotted to
//! `logs.json`. The request pipeline calls [`RequestLogStore::record`] once per
//! completed upstream request; the call never fails the request it describes.

use crate::snapshot::{load_snapshot, SnapshotWriter};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Default ring-buffer capacity.
pub const DEFAULT_MAX_LEN: usize = 1000;

/// One proxied request, as shown on the admin surface.
///
/// Field names are the wire format of `logs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    /// Millisecond timestamp at insertion, as a decimal string
    pub id: String,
    /// Local wall-clock time, `%Y-%m-%d %H:%M:%S`
    pub time: String,
    /// Raw unix timestamp in seconds
    pub timestamp: f64,
    pub ip: String,
    pub model: String,
    /// Seconds, rounded to 2 decimals
    pub duration: f64,
    pub status: u16,
    /// API-key display name
    pub key_name: String,
    /// Masked key tail
    #[serde(default)]
    pub token_suffix: String,
    /// Error text, empty on success
    #[serde(default)]
    pub error: String,
}

struct LogState {
    logs: VecDeque<RequestLog>,
    loaded: bool,
}

/// In-process request log store.
///
/// Constructed once by the composition root and shared via `Arc`. All state
/// sits behind a store-local mutex; disk writes go through a dedicated
/// background task and never block the recording path.
pub struct RequestLogStore {
    path: PathBuf,
    max_len: usize,
    state: Mutex<LogState>,
    writer: SnapshotWriter,
}

impl RequestLogStore {
    /// Create a store persisting to `path`, holding at most `max_len` records.
    ///
    /// Does no I/O; call [`initialize`](Self::initialize) before first use.
    /// Must be called from within a tokio runtime (the snapshot writer task is
    /// spawned here).
    pub fn new(path: PathBuf, max_len: usize) -> Self {
        Self {
            writer: SnapshotWriter::spawn(path.clone()),
            path,
            max_len,
            state: Mutex::new(LogState {
                logs: VecDeque::new(),
                loaded: false,
            }),
        }
    }

    /// Hydrate from the on-disk snapshot, once per process lifetime.
    ///
    /// A missing or malformed snapshot hydrates an empty store, never an
    /// error. The loaded flag is set either way, so a corrupt file is not
    /// re-read for the rest of the session.
    pub async fn initialize(&self) {
        let mut state = self.state.lock().await;
        if state.loaded {
            return;
        }

        if let Some(logs) = load_snapshot::<Vec<RequestLog>>(&self.path).await {
            state.logs = VecDeque::from(logs);
            state.logs.truncate(self.max_len);
            tracing::debug!(count = state.logs.len(), "Loaded request log snapshot");
        }

        state.loaded = true;
    }

    /// Record one completed request.
    ///
    /// Inserts at the head, evicts from the tail past `max_len`, then
    /// schedules a fire-and-forget snapshot write. Any failure is caught here
    /// and logged — recording telemetry must never fail the request itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        ip: &str,
        model: &str,
        duration: f64,
        status: u16,
        key_name: &str,
        token_suffix: &str,
        error: &str,
    ) {
        let entry = build_entry(ip, model, duration, status, key_name, token_suffix, error);

        let mut state = self.state.lock().await;
        state.logs.push_front(entry);
        state.logs.truncate(self.max_len);

        match serde_json::to_vec(&state.logs) {
            Ok(bytes) => self.writer.enqueue(bytes),
            Err(e) => {
                tracing::error!(error = %e, model = %model, "Failed to record request log");
            }
        }
    }

    /// Return up to `limit` most recent records, newest first.
    ///
    /// The result is an independent copy; it does not alias internal storage.
    pub async fn list(&self, limit: usize) -> Vec<RequestLog> {
        let state = self.state.lock().await;
        state.logs.iter().take(limit).cloned().collect()
    }

    /// Empty the store and persist the empty snapshot before returning.
    ///
    /// A persist failure is logged by the writer task, not raised.
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.logs.clear();
        }
        self.writer.persist_sync(b"[]".to_vec()).await;
    }

    /// Push the current state to disk and wait for it to land.
    ///
    /// Drains all previously scheduled fire-and-forget writes; the composition
    /// root may await this at shutdown.
    pub async fn flush(&self) {
        let bytes = {
            let state = self.state.lock().await;
            serde_json::to_vec(&state.logs)
        };
        match bytes {
            Ok(bytes) => self.writer.persist_sync(bytes).await,
            Err(e) => tracing::error!(error = %e, "Failed to serialize request log snapshot"),
        }
    }
}

fn build_entry(
    ip: &str,
    model: &str,
    duration: f64,
    status: u16,
    key_name: &str,
    token_suffix: &str,
    error: &str,
) -> RequestLog {
    let now = chrono::Local::now();
    let millis = now.timestamp_millis();

    RequestLog {
        id: millis.to_string(),
        time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        timestamp: millis as f64 / 1000.0,
        ip: ip.to_string(),
        model: model.to_string(),
        duration: (duration * 100.0).round() / 100.0,
        status,
        key_name: key_name.to_string(),
        token_suffix: token_suffix.to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir, max_len: usize) -> RequestLogStore {
        RequestLogStore::new(dir.path().join("logs.json"), max_len)
    }

    async fn record_n(store: &RequestLogStore, n: usize) {
        for i in 0..n {
            store
                .record("127.0.0.1", &format!("model-{}", i), 1.5, 200, "main", "...abcd", "")
                .await;
        }
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 3);
        store.initialize().await;

        record_n(&store, 5).await;

        let logs = store.list(10).await;
        assert_eq!(logs.len(), 3);
        // Newest first; model-0 and model-1 were evicted
        assert_eq!(logs[0].model, "model-4");
        assert_eq!(logs[1].model, "model-3");
        assert_eq!(logs[2].model, "model-2");
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 10);
        store.initialize().await;

        record_n(&store, 5).await;

        assert_eq!(store.list(2).await.len(), 2);
        assert_eq!(store.list(0).await.len(), 0);
        assert_eq!(store.list(100).await.len(), 5);
    }

    #[tokio::test]
    async fn test_record_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 10);
        store.initialize().await;

        store
            .record("10.0.0.8", "claude-3-5-sonnet", 1.23456, 429, "team-key", "...f9e2", "rate limited")
            .await;

        let logs = store.list(1).await;
        let log = &logs[0];
        assert_eq!(log.ip, "10.0.0.8");
        assert_eq!(log.duration, 1.23);
        assert_eq!(log.status, 429);
        assert_eq!(log.key_name, "team-key");
        assert_eq!(log.token_suffix, "...f9e2");
        assert_eq!(log.error, "rate limited");
        // id is the insertion time in milliseconds
        let millis: i64 = log.id.parse().unwrap();
        assert!((log.timestamp - millis as f64 / 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clear_empties_store_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 10);
        store.initialize().await;

        record_n(&store, 3).await;
        store.clear().await;

        assert!(store.list(10).await.is_empty());

        // clear persists synchronously, so the file is already rewritten
        let content = std::fs::read_to_string(dir.path().join("logs.json")).unwrap();
        let parsed: Vec<RequestLog> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_tolerates_malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        std::fs::write(&path, b"{definitely not an array").unwrap();

        let store = RequestLogStore::new(path, 10);
        store.initialize().await;
        assert!(store.list(10).await.is_empty());

        // The store stays usable after a corrupt load
        record_n(&store, 1).await;
        assert_eq!(store.list(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_truncates_oversized_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");

        let big = RequestLogStore::new(path.clone(), 10);
        big.initialize().await;
        record_n(&big, 5).await;
        big.flush().await;

        // Reopen with a smaller capacity
        let small = RequestLogStore::new(path, 2);
        small.initialize().await;
        let logs = small.list(10).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].model, "model-4");
    }
}

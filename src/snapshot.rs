//! Snapshot persistence for the telemetry stores
//!
//! Each store owns one JSON snapshot file that is fully rewritten on every
//! persist. Writes go through a dedicated background task per store, so the
//! recording path never waits on disk I/O.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

/// Load a snapshot file. A missing file is a valid empty start state.
///
/// A malformed snapshot is logged as a warning and discarded: a corrupt file
/// must never prevent the gateway from serving requests.
pub(crate) async fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read snapshot");
            return None;
        }
    };

    if bytes.is_empty() {
        return None;
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Malformed snapshot, starting with empty state"
            );
            None
        }
    }
}

/// Write a complete snapshot, creating parent directories on first use.
async fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// A queued snapshot. `ack` is present for synchronous persists
/// (`clear`/`reset`/`flush`), which wait until the write has landed.
struct Persist {
    bytes: Vec<u8>,
    ack: Option<oneshot::Sender<()>>,
}

/// Handle to a store's dedicated snapshot writer task.
///
/// [`enqueue`](Self::enqueue) is non-blocking: the snapshot is handed to the
/// background task and the caller moves on. The channel is FIFO, so an
/// acknowledged write is ordered after every previously scheduled one.
#[derive(Clone)]
pub(crate) struct SnapshotWriter {
    sender: mpsc::UnboundedSender<Persist>,
}

impl SnapshotWriter {
    /// Spawn the writer task for one snapshot file.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            writer_task(path, rx).await;
        });

        Self { sender: tx }
    }

    /// Schedule a fire-and-forget snapshot write.
    pub(crate) fn enqueue(&self, bytes: Vec<u8>) {
        let _ = self.sender.send(Persist { bytes, ack: None });
    }

    /// Write a snapshot and wait until it has landed (or failed and been
    /// logged). Previously scheduled fire-and-forget writes land first.
    pub(crate) async fn persist_sync(&self, bytes: Vec<u8>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let persist = Persist {
            bytes,
            ack: Some(ack_tx),
        };
        if self.sender.send(persist).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

/// Background writer task: consumes queued snapshots and rewrites the file.
///
/// A backlog of fire-and-forget snapshots collapses into the newest one — each
/// snapshot is a complete overwrite, so intermediate states carry no
/// information. Snapshots carrying an ack are never skipped.
async fn writer_task(path: PathBuf, mut rx: mpsc::UnboundedReceiver<Persist>) {
    while let Some(mut persist) = rx.recv().await {
        while persist.ack.is_none() {
            match rx.try_recv() {
                Ok(next) => persist = next,
                Err(_) => break,
            }
        }

        if let Err(e) = write_snapshot(&path, &persist.bytes).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to write snapshot");
        }

        if let Some(ack) = persist.ack {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Vec<u64>> = load_snapshot(&dir.path().join("missing.json")).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let loaded: Option<Vec<u64>> = load_snapshot(&path).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_writes_eventually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("out.json");
        let writer = SnapshotWriter::spawn(path.clone());

        writer.enqueue(b"[1,2,3]".to_vec());

        // Wait for the background write
        tokio::time::sleep(Duration::from_millis(100)).await;

        let loaded: Option<Vec<u64>> = load_snapshot(&path).await;
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_persist_sync_lands_after_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let writer = SnapshotWriter::spawn(path.clone());

        writer.enqueue(b"[1]".to_vec());
        writer.enqueue(b"[1,2]".to_vec());
        writer.persist_sync(b"[]".to_vec()).await;

        // The acknowledged write is the last one in program order
        let loaded: Option<Vec<u64>> = load_snapshot(&path).await;
        assert_eq!(loaded, Some(vec![]));
    }
}

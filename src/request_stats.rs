//! 请求统计模块 - 按小时/天统计请求数据
//!
//! Hourly and daily success/failure buckets plus per-model lifetime counters,
//! snapshotted to `stats.json`. Buckets outside the retention window are
//! evicted on every write; there is no background timer.

use crate::snapshot::{load_snapshot, SnapshotWriter};
use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Default number of hour buckets kept (48 hours).
pub const DEFAULT_HOURLY_KEEP: usize = 48;
/// Default number of day buckets kept (30 days).
pub const DEFAULT_DAILY_KEEP: usize = 30;

const HOUR_KEY_FORMAT: &str = "%Y-%m-%dT%H";
const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Map an upstream status code to the success flag used by the stats store.
pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Success/failure counts inside one time bucket.
///
/// Invariant: `total == success + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

/// Persisted layout of `stats.json`.
///
/// Hour keys are `YYYY-MM-DDTHH`, day keys `YYYY-MM-DD`. Keys are fixed-width,
/// so lexicographic order (the `BTreeMap` order) is chronological order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StatsSnapshot {
    #[serde(default)]
    hourly: BTreeMap<String, BucketCounts>,
    #[serde(default)]
    daily: BTreeMap<String, BucketCounts>,
    #[serde(default)]
    models: BTreeMap<String, u64>,
}

/// One point of the dense hourly series returned by `query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyPoint {
    /// Hour label, `%H:00`
    pub hour: String,
    /// Short date label, `%m-%d`
    pub date: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

/// One point of the dense daily series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPoint {
    /// Short date label, `%m-%d`
    pub date: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

/// One entry of the top-models list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCount {
    pub model: String,
    pub count: u64,
}

/// Totals across all stored hourly buckets (the retention window, not the
/// queried window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Percentage rounded to 1 decimal, `0` when no requests are stored
    pub success_rate: f64,
}

/// Full report returned by [`RequestStatsStore::query`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub hourly: Vec<HourlyPoint>,
    pub daily: Vec<DailyPoint>,
    pub models: Vec<ModelCount>,
    pub summary: StatsSummary,
}

struct StatsState {
    data: StatsSnapshot,
    loaded: bool,
}

/// In-process request statistics store.
///
/// Constructed once by the composition root and shared via `Arc`. State sits
/// behind a store-local mutex, independent of [`RequestLogStore`]'s lock;
/// disk writes go through a dedicated background task.
///
/// [`RequestLogStore`]: crate::request_log::RequestLogStore
pub struct RequestStatsStore {
    path: PathBuf,
    hourly_keep: usize,
    daily_keep: usize,
    state: Mutex<StatsState>,
    writer: SnapshotWriter,
}

impl RequestStatsStore {
    /// Create a store persisting to `path`, keeping `hourly_keep` hour buckets
    /// and `daily_keep` day buckets.
    ///
    /// Does no I/O; call [`initialize`](Self::initialize) before first use.
    /// Must be called from within a tokio runtime.
    pub fn new(path: PathBuf, hourly_keep: usize, daily_keep: usize) -> Self {
        Self {
            writer: SnapshotWriter::spawn(path.clone()),
            path,
            hourly_keep,
            daily_keep,
            state: Mutex::new(StatsState {
                data: StatsSnapshot::default(),
                loaded: false,
            }),
        }
    }

    /// Hydrate the hourly, daily, and model maps, once per process lifetime.
    ///
    /// A missing or malformed snapshot reconstructs empty maps, never an
    /// error; the loaded flag is set either way.
    pub async fn initialize(&self) {
        let mut state = self.state.lock().await;
        if state.loaded {
            return;
        }

        if let Some(data) = load_snapshot::<StatsSnapshot>(&self.path).await {
            tracing::debug!(
                hourly = data.hourly.len(),
                daily = data.daily.len(),
                models = data.models.len(),
                "Loaded request stats snapshot"
            );
            state.data = data;
        }

        state.loaded = true;
    }

    /// Record one completed request against the current hour and day buckets
    /// and the model's lifetime counter, then sweep retention and schedule a
    /// fire-and-forget persist.
    pub async fn record(&self, model: &str, success: bool) {
        self.record_at(Local::now(), model, success).await;
    }

    async fn record_at(&self, now: DateTime<Local>, model: &str, success: bool) {
        let hour_key = now.format(HOUR_KEY_FORMAT).to_string();
        let day_key = now.format(DAY_KEY_FORMAT).to_string();

        let mut state = self.state.lock().await;
        bump(state.data.hourly.entry(hour_key).or_default(), success);
        bump(state.data.daily.entry(day_key).or_default(), success);
        *state.data.models.entry(model.to_string()).or_default() += 1;

        // Retention sweep runs on every write
        prune(&mut state.data.hourly, self.hourly_keep);
        prune(&mut state.data.daily, self.daily_keep);

        match serde_json::to_vec(&state.data) {
            Ok(bytes) => self.writer.enqueue(bytes),
            Err(e) => {
                tracing::error!(error = %e, model = %model, "Failed to record request stats");
            }
        }
    }

    /// Build the report for the admin surface.
    ///
    /// The hourly/daily series are dense and gap-free: exactly `hours`/`days`
    /// points walking backward from now, oldest first, with absent buckets
    /// synthesized as zero-valued entries. The summary sums every stored
    /// hourly bucket regardless of the `hours` window.
    pub async fn query(&self, hours: usize, days: usize) -> StatsReport {
        self.query_at(Local::now(), hours, days).await
    }

    async fn query_at(&self, now: DateTime<Local>, hours: usize, days: usize) -> StatsReport {
        let state = self.state.lock().await;
        let data = &state.data;

        let mut hourly = Vec::with_capacity(hours);
        for i in (0..hours).rev() {
            let dt = now - Duration::hours(i as i64);
            let key = dt.format(HOUR_KEY_FORMAT).to_string();
            let counts = data.hourly.get(&key).copied().unwrap_or_default();
            hourly.push(HourlyPoint {
                hour: dt.format("%H:00").to_string(),
                date: dt.format("%m-%d").to_string(),
                total: counts.total,
                success: counts.success,
                failed: counts.failed,
            });
        }

        let mut daily = Vec::with_capacity(days);
        for i in (0..days).rev() {
            let dt = now - Duration::days(i as i64);
            let key = dt.format(DAY_KEY_FORMAT).to_string();
            let counts = data.daily.get(&key).copied().unwrap_or_default();
            daily.push(DailyPoint {
                date: dt.format("%m-%d").to_string(),
                total: counts.total,
                success: counts.success,
                failed: counts.failed,
            });
        }

        let mut models: Vec<ModelCount> = data
            .models
            .iter()
            .map(|(model, count)| ModelCount {
                model: model.clone(),
                count: *count,
            })
            .collect();
        models.sort_by(|a, b| b.count.cmp(&a.count));
        models.truncate(10);

        let total: u64 = data.hourly.values().map(|c| c.total).sum();
        let success: u64 = data.hourly.values().map(|c| c.success).sum();
        let failed: u64 = data.hourly.values().map(|c| c.failed).sum();
        let success_rate = if total > 0 {
            (success as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        StatsReport {
            hourly,
            daily,
            models,
            summary: StatsSummary {
                total,
                success,
                failed,
                success_rate,
            },
        }
    }

    /// Clear all three maps and persist the empty snapshot before returning.
    pub async fn reset(&self) {
        let bytes = {
            let mut state = self.state.lock().await;
            state.data = StatsSnapshot::default();
            serde_json::to_vec(&state.data)
        };
        match bytes {
            Ok(bytes) => self.writer.persist_sync(bytes).await,
            Err(e) => tracing::error!(error = %e, "Failed to serialize request stats snapshot"),
        }
    }

    /// Push the current state to disk and wait for it to land.
    ///
    /// Drains all previously scheduled fire-and-forget writes; the composition
    /// root may await this at shutdown.
    pub async fn flush(&self) {
        let bytes = {
            let state = self.state.lock().await;
            serde_json::to_vec(&state.data)
        };
        match bytes {
            Ok(bytes) => self.writer.persist_sync(bytes).await,
            Err(e) => tracing::error!(error = %e, "Failed to serialize request stats snapshot"),
        }
    }
}

fn bump(counts: &mut BucketCounts, success: bool) {
    counts.total += 1;
    if success {
        counts.success += 1;
    } else {
        counts.failed += 1;
    }
}

/// Evict the oldest buckets until at most `keep` remain.
///
/// `BTreeMap` iterates in key order and the keys are fixed-width timestamps,
/// so the first key is always the oldest bucket.
fn prune(buckets: &mut BTreeMap<String, BucketCounts>, keep: usize) {
    while buckets.len() > keep {
        let oldest = match buckets.keys().next() {
            Some(key) => key.clone(),
            None => break,
        };
        buckets.remove(&oldest);
    }
}

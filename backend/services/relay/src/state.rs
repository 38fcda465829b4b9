//! Display state shared between the sync engine and the status API.
//!
//! The run-completion path is the only writer. Readers take snapshots.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::connector::SyncResult;
use crate::sync::RunOutcome;

/// Maximum number of entries kept in the activity log.
pub const ACTIVITY_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Client,
    Product,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub category: LogCategory,
    pub status: LogStatus,
    pub message: String,
}

impl LogEntry {
    pub fn new(category: LogCategory, status: LogStatus, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            status,
            message: message.into(),
        }
    }
}

/// Fixed-capacity log, newest entry first.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(ACTIVITY_LOG_CAPACITY);
    }

    /// Entries newest-first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total: u64,
    pub synced: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl CollectionStats {
    fn from_result(result: SyncResult, at: DateTime<Utc>) -> Self {
        Self {
            total: result.total,
            synced: result.synced,
            last_sync: Some(at),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub clients: CollectionStats,
    pub products: CollectionStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub stats: SyncStats,
    pub logs: Vec<LogEntry>,
    pub in_progress: bool,
}

/// Process-wide sync state: stats, activity log and the in-progress flag.
#[derive(Debug, Default)]
pub struct SyncStateStore {
    stats: RwLock<SyncStats>,
    log: RwLock<ActivityLog>,
    in_progress: AtomicBool,
}

impl SyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move Idle → Running. Returns `None` when a run is already in flight.
    pub fn try_begin_run(self: &Arc<Self>) -> Option<RunGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                store: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> SyncStats {
        *self.stats.read().await
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let stats = self.stats().await;
        let logs = self.log.read().await.entries().cloned().collect();
        StatusSnapshot {
            stats,
            logs,
            in_progress: self.is_running(),
        }
    }

    pub async fn append_log(&self, entry: LogEntry) {
        self.log.write().await.append(entry);
    }

    /// Publish a finished run.
    ///
    /// Collection entries go in first so the run's `system` entry ends up on
    /// top. Stats change only when the run succeeded.
    pub async fn record_run(&self, outcome: RunOutcome) {
        let mut log = self.log.write().await;

        for report in &outcome.collections {
            let category = report.collection.log_category();
            let entry = match &report.error {
                None => LogEntry::new(
                    category,
                    LogStatus::Success,
                    format!(
                        "{}: {} of {} records synced",
                        report.collection, report.result.synced, report.result.total
                    ),
                ),
                Some(error) => LogEntry::new(
                    category,
                    LogStatus::Error,
                    format!(
                        "{} sync aborted after {} records: {error}",
                        report.collection, report.result.synced
                    ),
                ),
            };
            log.append(entry);
        }

        match outcome.result {
            Ok(summary) => {
                let now = Utc::now();
                *self.stats.write().await = SyncStats {
                    clients: CollectionStats::from_result(summary.clients, now),
                    products: CollectionStats::from_result(summary.products, now),
                };
                log.append(LogEntry::new(
                    LogCategory::System,
                    LogStatus::Success,
                    format!(
                        "sync completed: {} clients and {} products",
                        summary.clients.synced, summary.products.synced
                    ),
                ));
            }
            Err(e) => {
                log.append(LogEntry::new(
                    LogCategory::System,
                    LogStatus::Error,
                    format!("sync failed: {e}"),
                ));
            }
        }
    }
}

/// Held for the lifetime of one run; dropping it returns the store to Idle,
/// including while unwinding.
#[derive(Debug)]
pub struct RunGuard {
    store: Arc<SyncStateStore>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.store.in_progress.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    use crate::connector::Collection;
    use crate::datasystem::client::{AuthError, FetchError};
    use crate::sync::{CollectionReport, OrchestrationError, RunSummary};

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(LogCategory::System, LogStatus::Info, format!("entry {n}"))
    }

    fn report(collection: Collection, total: u64, synced: u64, error: Option<&str>) -> CollectionReport {
        CollectionReport {
            collection,
            result: SyncResult { total, synced },
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn log_is_newest_first() {
        let mut log = ActivityLog::default();
        log.append(entry(1));
        log.append(entry(2));
        let messages: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 1"]);
    }

    #[test]
    fn log_drops_oldest_beyond_capacity() {
        let mut log = ActivityLog::default();
        for n in 1..=ACTIVITY_LOG_CAPACITY + 1 {
            log.append(entry(n));
        }
        assert_eq!(log.entries().count(), ACTIVITY_LOG_CAPACITY);
        assert_eq!(log.entries().next().unwrap().message, "entry 51");
        assert!(log.entries().all(|e| e.message != "entry 1"));
        assert_eq!(log.entries().last().unwrap().message, "entry 2");
    }

    #[test]
    fn only_one_run_guard_at_a_time() {
        let store = Arc::new(SyncStateStore::new());
        let guard = store.try_begin_run().expect("idle store admits a run");
        assert!(store.is_running());
        assert!(store.try_begin_run().is_none());

        drop(guard);
        assert!(!store.is_running());
        assert!(store.try_begin_run().is_some());
    }

    #[tokio::test]
    async fn successful_run_overwrites_stats() {
        let store = SyncStateStore::new();
        let outcome = RunOutcome {
            collections: vec![
                report(Collection::Clients, 10, 9, None),
                report(Collection::Products, 4, 4, None),
            ],
            result: Ok(RunSummary {
                clients: SyncResult { total: 10, synced: 9 },
                products: SyncResult { total: 4, synced: 4 },
            }),
        };

        store.record_run(outcome).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.stats.clients.total, 10);
        assert_eq!(snapshot.stats.clients.synced, 9);
        assert_eq!(snapshot.stats.products.synced, 4);
        assert!(snapshot.stats.clients.last_sync.is_some());
        assert_eq!(snapshot.stats.clients.last_sync, snapshot.stats.products.last_sync);

        assert_eq!(snapshot.logs.len(), 3);
        assert_eq!(snapshot.logs[0].category, LogCategory::System);
        assert_eq!(snapshot.logs[0].status, LogStatus::Success);
        assert_eq!(snapshot.logs[0].message, "sync completed: 9 clients and 4 products");
        assert_eq!(snapshot.logs[1].category, LogCategory::Product);
        assert_eq!(snapshot.logs[2].category, LogCategory::Client);
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_stats() {
        let store = SyncStateStore::new();
        store
            .record_run(RunOutcome {
                collections: Vec::new(),
                result: Ok(RunSummary {
                    clients: SyncResult { total: 2, synced: 2 },
                    products: SyncResult { total: 1, synced: 1 },
                }),
            })
            .await;
        let before = store.stats().await;

        store
            .record_run(RunOutcome {
                collections: Vec::new(),
                result: Err(OrchestrationError::Auth(AuthError::MissingToken)),
            })
            .await;

        assert_eq!(store.stats().await, before);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.logs[0].status, LogStatus::Error);
        assert!(snapshot.logs[0].message.starts_with("sync failed: authentication failed"));
    }

    #[tokio::test]
    async fn collection_failure_is_logged_under_its_category() {
        let store = SyncStateStore::new();
        store
            .record_run(RunOutcome {
                collections: vec![
                    report(Collection::Clients, 0, 0, Some("HTTP 500 Internal Server Error: boom")),
                    report(Collection::Products, 3, 3, None),
                ],
                result: Err(OrchestrationError::Fetch {
                    collection: Collection::Clients,
                    source: FetchError::HttpError {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: "boom".to_string(),
                    },
                }),
            })
            .await;

        let snapshot = store.snapshot().await;
        let client_entry = snapshot
            .logs
            .iter()
            .find(|e| e.category == LogCategory::Client)
            .unwrap();
        assert_eq!(client_entry.status, LogStatus::Error);
        assert!(client_entry.message.contains("boom"));
        assert_eq!(snapshot.logs[0].category, LogCategory::System);
        assert_eq!(snapshot.logs[0].status, LogStatus::Error);
        assert_eq!(store.stats().await, SyncStats::default());
    }

    #[test]
    fn log_entry_serializes_with_type_key() {
        let json = serde_json::to_value(LogEntry::new(LogCategory::Product, LogStatus::Info, "hi")).unwrap();
        assert_eq!(json["type"], "product");
        assert_eq!(json["status"], "info");
        assert_eq!(json["message"], "hi");
    }

    #[tokio::test]
    async fn snapshot_serializes_camel_case() {
        let store = SyncStateStore::new();
        let json = serde_json::to_value(store.snapshot().await).unwrap();
        assert_eq!(json["inProgress"], false);
        assert!(json["stats"]["clients"]["lastSync"].is_null());
        assert_eq!(json["logs"], serde_json::json!([]));
    }
}

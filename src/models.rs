use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One visit as stored in the history file.
///
/// `timestamp` stays a string so that malformed rows sent by clients can be
/// reported by the dedup pass instead of failing the whole request.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VisitRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, alias = "ip")]
    pub identity: String,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

impl VisitRecord {
    pub fn new(timestamp: DateTime<Utc>, identity: impl Into<String>) -> Self {
        Self {
            timestamp: crate::clock::format_timestamp(timestamp),
            identity: identity.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Everything persisted to the stats file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsData {
    pub total_visitors: u64,
    pub last_visit: Option<DateTime<Utc>>,
    pub daily_identities: BTreeSet<String>,
    pub last_reset_day: String,
    pub downloads_by_day: BTreeMap<String, u64>,
    pub total_downloads: u64,
    pub visit_history: Vec<VisitRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub total_visitors: u64,
    pub last_visit: Option<DateTime<Utc>>,
    pub unique_today: usize,
    pub current_connected: usize,
    pub total_downloads: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSnapshot {
    pub downloads_by_day: BTreeMap<String, u64>,
    pub total_downloads: u64,
    pub today_downloads: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitRequest {
    pub fingerprint: Option<String>,
    pub page: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_connected: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default)]
    pub visit_history: Vec<VisitRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub stats: CounterSnapshot,
    pub merged_from_client: usize,
    pub discarded: usize,
    pub invalid: Vec<String>,
    pub unexplained_gap: u64,
    /// Stored rows that could not be read; they are kept until compaction.
    #[serde(default)]
    pub unreadable_server_rows: Vec<String>,
    pub changed: bool,
    pub visit_history: Vec<VisitRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SyncDownloadsRequest {
    pub downloads: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
pub struct SetCountRequest {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanHistoryResponse {
    pub kept: usize,
    pub discarded: usize,
    /// Rows removed because they could not be read, with the reason.
    pub invalid: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: String,
    pub visits: u64,
    pub downloads: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPoint {
    pub week: String,
    pub start_date: String,
    pub end_date: String,
    pub visits: u64,
    pub downloads: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub last_7_days: Vec<DailyPoint>,
    pub weekly_totals: Vec<WeeklyPoint>,
}

use crate::clock::parse_day_key;
use crate::models::{DownloadSnapshot, StatsData};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Recomputes the derived total from the per-day map.
pub fn recount(data: &mut StatsData) {
    data.total_downloads = data.downloads_by_day.values().copied().sum();
}

pub fn record_download(data: &mut StatsData, today: &str) {
    let entry = data.downloads_by_day.entry(today.to_string()).or_default();
    *entry = entry.saturating_add(1);
    recount(data);
    info!(
        "cv downloaded: {} today, {} total",
        data.downloads_by_day.get(today).copied().unwrap_or_default(),
        data.total_downloads
    );
}

/// Merges per-day counts held by a client, keeping the larger count for each
/// day. Keys that are not `YYYY-MM-DD` are skipped.
pub fn merge_client_downloads(data: &mut StatsData, client: &BTreeMap<String, u64>) -> bool {
    let mut changed = false;
    for (day, &count) in client {
        if parse_day_key(day).is_none() {
            warn!("ignoring download count for malformed day {day:?}");
            continue;
        }
        let current = data.downloads_by_day.get(day).copied().unwrap_or_default();
        if count > current {
            data.downloads_by_day.insert(day.clone(), count);
            changed = true;
        }
    }
    recount(data);
    changed
}

pub fn download_snapshot(data: &StatsData, today: &str) -> DownloadSnapshot {
    DownloadSnapshot {
        downloads_by_day: data.downloads_by_day.clone(),
        total_downloads: data.total_downloads,
        today_downloads: data.downloads_by_day.get(today).copied().unwrap_or_default(),
    }
}

use crate::clock::{day_key, parse_timestamp};
use crate::dedup::dedup_visits;
use crate::errors::RecordError;
use crate::models::{CleanHistoryResponse, CounterSnapshot, StatsData, VisitRecord};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    Counted,
    AlreadySeenToday,
}

/// Extra fields stored with an accepted visit.
#[derive(Debug, Default, Clone)]
pub struct VisitMeta {
    pub page: Option<String>,
    pub source: Option<String>,
}

/// Clears the daily identity set when `today` differs from the stored day.
pub fn roll_day(data: &mut StatsData, today: &str) -> bool {
    if data.last_reset_day == today {
        return false;
    }
    data.daily_identities.clear();
    data.last_reset_day = today.to_string();
    true
}

pub fn record_visit_at(
    data: &mut StatsData,
    identity: &str,
    meta: VisitMeta,
    now: DateTime<Utc>,
    zone: Tz,
) -> Result<VisitOutcome, RecordError> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(RecordError::MissingIdentity);
    }

    roll_day(data, &day_key(now, zone));
    if !data.daily_identities.insert(identity.to_string()) {
        return Ok(VisitOutcome::AlreadySeenToday);
    }

    data.total_visitors = data.total_visitors.saturating_add(1);
    data.last_visit = Some(now);
    data.visit_history.push(
        VisitRecord::new(now, identity)
            .with_meta("page", meta.page.unwrap_or_else(|| "portfolio".to_string()))
            .with_meta("source", meta.source.unwrap_or_else(|| "server_tracked".to_string()))
            .with_meta("session", format!("server_{}", now.timestamp_millis())),
    );

    Ok(VisitOutcome::Counted)
}

/// Drops history rows older than `retention`. Rows whose timestamp no longer
/// parses are left for the dedup pass to report. Nothing is pruned when the
/// retention is not positive or reaches past the representable range.
pub fn prune_history(data: &mut StatsData, now: DateTime<Utc>, retention: Duration) -> usize {
    if retention <= Duration::zero() {
        return 0;
    }
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return 0;
    };
    let before = data.visit_history.len();
    data.visit_history
        .retain(|visit| parse_timestamp(&visit.timestamp).map_or(true, |at| at > cutoff));
    before - data.visit_history.len()
}

/// Rewrites the history through the dedup pass. Unreadable rows are removed
/// and listed in the report. `totalVisitors` is left alone.
pub fn compact_history(data: &mut StatsData, zone: Tz) -> CleanHistoryResponse {
    let history = std::mem::take(&mut data.visit_history);
    let report = dedup_visits(history, zone);
    for record in &report.invalid {
        warn!("compaction removed unreadable history {record}");
    }

    let response = CleanHistoryResponse {
        kept: report.kept.len(),
        discarded: report.discarded,
        invalid: report.invalid.iter().map(ToString::to_string).collect(),
    };
    data.visit_history = report.kept;
    info!(
        "history compacted: {} kept, {} duplicates, {} unreadable",
        response.kept,
        response.discarded,
        response.invalid.len()
    );
    response
}

pub fn reset_counters(data: &mut StatsData, now: DateTime<Utc>, zone: Tz) {
    data.total_visitors = 0;
    data.last_visit = None;
    data.daily_identities.clear();
    data.last_reset_day = day_key(now, zone);
    info!("visitor counters reset");
}

pub fn set_visitor_count(data: &mut StatsData, count: u64, now: DateTime<Utc>) {
    data.total_visitors = count;
    data.last_visit = Some(now);
    info!("visitor count set manually to {count}");
}

pub fn snapshot(data: &StatsData, today: &str, current_connected: usize) -> CounterSnapshot {
    let unique_today = if data.last_reset_day == today {
        data.daily_identities.len()
    } else {
        0
    };
    CounterSnapshot {
        total_visitors: data.total_visitors,
        last_visit: data.last_visit,
        unique_today,
        current_connected,
        total_downloads: data.total_downloads,
    }
}

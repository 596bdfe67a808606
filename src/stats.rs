use crate::clock::{date_key, local_date, parse_timestamp};
use crate::models::{AnalyticsResponse, DailyPoint, StatsData, WeeklyPoint};
use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Daily and weekly series over the stored history. Callers pass a history
/// that has already been through the dedup pass.
pub fn build_analytics_at(today: NaiveDate, data: &StatsData, zone: Tz) -> AnalyticsResponse {
    const WEEK_COUNT: usize = 8;

    let visits = visits_by_day(data, zone);
    let count_on = |date: NaiveDate| {
        let key = date_key(date);
        (
            visits.get(&key).copied().unwrap_or_default(),
            data.downloads_by_day.get(&key).copied().unwrap_or_default(),
        )
    };

    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = today - Duration::days(offset as i64);
        let (visits, downloads) = count_on(date);
        last_7_days.push(DailyPoint {
            date: date.to_string(),
            visits,
            downloads,
        });
    }

    let current_week_start = week_start(today);
    let mut weekly_totals = Vec::with_capacity(WEEK_COUNT);
    for offset in (0..WEEK_COUNT).rev() {
        let start = current_week_start - Duration::weeks(offset as i64);
        let end = start + Duration::days(6);

        let mut visit_sum = 0u64;
        let mut download_sum = 0u64;
        for day_offset in 0..7 {
            let (visits, downloads) = count_on(start + Duration::days(day_offset));
            visit_sum = visit_sum.saturating_add(visits);
            download_sum = download_sum.saturating_add(downloads);
        }

        weekly_totals.push(WeeklyPoint {
            week: week_label(start),
            start_date: start.to_string(),
            end_date: end.to_string(),
            visits: visit_sum,
            downloads: download_sum,
        });
    }

    AnalyticsResponse {
        last_7_days,
        weekly_totals,
    }
}

fn visits_by_day(data: &StatsData, zone: Tz) -> BTreeMap<String, u64> {
    let mut days = BTreeMap::new();
    for visit in &data.visit_history {
        if let Ok(at) = parse_timestamp(&visit.timestamp) {
            *days.entry(date_key(local_date(at, zone))).or_default() += 1;
        }
    }
    days
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

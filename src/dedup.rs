use crate::clock::{day_key, parse_timestamp};
use crate::errors::RecordError;
use crate::models::VisitRecord;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRecord {
    pub index: usize,
    pub reason: RecordError,
}

impl std::fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record {}: {}", self.index, self.reason)
    }
}

#[derive(Debug, Default)]
pub struct DedupReport {
    /// Surviving records in chronological order.
    pub kept: Vec<VisitRecord>,
    pub discarded: usize,
    pub invalid: Vec<InvalidRecord>,
}

impl DedupReport {
    pub fn total(&self) -> usize {
        self.kept.len() + self.discarded + self.invalid.len()
    }
}

/// Reduces `records` to at most one visit per (day, identity), keeping the
/// earliest one. Malformed records are reported with their input index.
pub fn dedup_visits(records: Vec<VisitRecord>, zone: Tz) -> DedupReport {
    let mut report = DedupReport::default();
    let mut valid = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        if record.identity.trim().is_empty() {
            report.invalid.push(InvalidRecord {
                index,
                reason: RecordError::MissingIdentity,
            });
            continue;
        }
        match parse_timestamp(&record.timestamp) {
            Ok(instant) => valid.push((instant, record)),
            Err(reason) => report.invalid.push(InvalidRecord { index, reason }),
        }
    }

    // stable: equal instants keep input order
    valid.sort_by_key(|(instant, _)| *instant);

    let mut seen: HashMap<String, HashSet<String>> = HashMap::new();
    for (instant, record) in valid {
        let day = seen.entry(day_key(instant, zone)).or_default();
        if day.insert(record.identity.clone()) {
            report.kept.push(record);
        } else {
            report.discarded += 1;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(timestamp: &str, identity: &str) -> VisitRecord {
        VisitRecord {
            timestamp: timestamp.to_string(),
            identity: identity.to_string(),
            ..VisitRecord::default()
        }
    }

    #[test]
    fn keeps_earliest_visit_per_identity_and_day() {
        let input = vec![
            visit("2025-03-03T10:00:10Z", "A"),
            visit("2025-03-03T10:00:05Z", "A"),
            visit("2025-03-03T10:00:07Z", "B"),
        ];

        let report = dedup_visits(input, Tz::UTC);

        let kept: Vec<_> = report
            .kept
            .iter()
            .map(|r| (r.identity.as_str(), r.timestamp.as_str()))
            .collect();
        assert_eq!(
            kept,
            vec![("A", "2025-03-03T10:00:05Z"), ("B", "2025-03-03T10:00:07Z")]
        );
        assert_eq!(report.discarded, 1);
        assert!(report.invalid.is_empty());
    }

    #[test]
    fn second_pass_removes_nothing() {
        let input = vec![
            visit("2025-02-03T08:30:00Z", "172.16.0.20"),
            visit("2025-02-03T15:20:00Z", "172.16.0.20"),
            visit("2025-02-04T15:20:00Z", "172.16.0.20"),
            visit("2025-02-03T09:00:00Z", "172.16.0.21"),
        ];

        let first = dedup_visits(input, Tz::UTC);
        let second = dedup_visits(first.kept.clone(), Tz::UTC);

        assert_eq!(first.kept.len(), 3);
        assert_eq!(second.kept, first.kept);
        assert_eq!(second.discarded, 0);
    }

    #[test]
    fn same_identity_on_different_days_is_kept() {
        let input = vec![
            visit("2025-04-30T21:10:00Z", "10.0.0.50"),
            visit("2025-05-01T08:00:00Z", "10.0.0.50"),
        ];
        assert_eq!(dedup_visits(input, Tz::UTC).kept.len(), 2);
    }

    #[test]
    fn day_boundary_uses_configured_zone() {
        // 22:30Z and 23:30Z are different days in Paris (UTC+1 in March)
        let input = vec![
            visit("2025-03-03T22:30:00Z", "A"),
            visit("2025-03-03T23:30:00Z", "A"),
        ];
        assert_eq!(dedup_visits(input.clone(), Tz::UTC).kept.len(), 1);
        assert_eq!(dedup_visits(input, chrono_tz::Europe::Paris).kept.len(), 2);
    }

    #[test]
    fn malformed_records_are_reported_not_dropped() {
        let input = vec![
            visit("2025-03-03T10:00:00Z", "A"),
            visit("", "B"),
            visit("yesterday", "C"),
            visit("2025-03-03T11:00:00Z", " "),
            visit("2025-03-03T12:00:00Z", "A"),
        ];

        let report = dedup_visits(input, Tz::UTC);

        assert_eq!(report.kept.len(), 1);
        assert_eq!(report.discarded, 1);
        let reasons: Vec<_> = report.invalid.iter().map(|i| (i.index, i.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (1, RecordError::MissingTimestamp),
                (2, RecordError::BadTimestamp("yesterday".to_string())),
                (3, RecordError::MissingIdentity),
            ]
        );
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn metadata_is_carried_through() {
        let input = vec![visit("2025-01-06T10:15:00.000Z", "192.168.1.100")
            .with_meta("page", "portfolio")
            .with_meta("source", "organic")];

        let report = dedup_visits(input, Tz::UTC);

        assert_eq!(report.kept[0].metadata["source"], "organic");
    }
}

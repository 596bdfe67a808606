use crate::dedup::{InvalidRecord, dedup_visits};
use crate::models::{StatsData, VisitRecord};
use chrono_tz::Tz;
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub merged_from_client: usize,
    pub discarded: usize,
    /// Client rows that could not be used.
    pub invalid: Vec<InvalidRecord>,
    /// Stored rows that could not be read. They stay in the history until an
    /// explicit compaction.
    pub unreadable_server_rows: Vec<InvalidRecord>,
    /// `totalVisitors` in excess of the history it can be explained by.
    pub unexplained_gap: u64,
    pub changed: bool,
}

impl ReconcileOutcome {
    pub fn is_conflict(&self) -> bool {
        self.merged_from_client > 0 || self.unexplained_gap > 0
    }
}

pub fn reconcile(data: &mut StatsData, client_history: Vec<VisitRecord>, zone: Tz) -> ReconcileOutcome {
    let previous_history = std::mem::take(&mut data.visit_history);
    let previous_total = data.total_visitors;

    let server = dedup_visits(previous_history.clone(), zone);
    let server_len = server.kept.len();
    let unreadable: Vec<VisitRecord> = server
        .invalid
        .iter()
        .map(|record| previous_history[record.index].clone())
        .collect();
    if !unreadable.is_empty() {
        warn!(
            "keeping {} unreadable rows in server history: {}",
            unreadable.len(),
            describe(&server.invalid)
        );
    }

    let client_len = client_history.len();
    let mut combined = server.kept;
    combined.extend(client_history);
    let merged = dedup_visits(combined, zone);

    // invalid indices are reported relative to the client history
    let invalid = merged
        .invalid
        .into_iter()
        .map(|mut record| {
            record.index -= server_len;
            record
        })
        .collect::<Vec<_>>();

    let merged_from_client = merged.kept.len() - server_len;
    let history_len = merged.kept.len() as u64;
    data.visit_history = merged.kept;
    data.visit_history.extend(unreadable);
    data.total_visitors = data.total_visitors.max(history_len);

    let outcome = ReconcileOutcome {
        merged_from_client,
        discarded: merged.discarded,
        invalid,
        unreadable_server_rows: server.invalid,
        unexplained_gap: data.total_visitors - history_len,
        changed: data.visit_history != previous_history || data.total_visitors != previous_total,
    };

    if outcome.is_conflict() {
        warn!(
            "reconciliation conflict: {} visits only known to client, {} visits without history",
            outcome.merged_from_client, outcome.unexplained_gap
        );
    }
    if outcome.changed {
        info!(
            "reconciled {client_len} client visits: total {} -> {}, history {}",
            previous_total, data.total_visitors, history_len
        );
    }

    outcome
}

fn describe(records: &[InvalidRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(day: u32, hour: u32, identity: &str) -> VisitRecord {
        VisitRecord {
            timestamp: format!("2025-03-{day:02}T{hour:02}:00:00.000Z"),
            identity: identity.to_string(),
            ..VisitRecord::default()
        }
    }

    fn server_with(history: Vec<VisitRecord>) -> StatsData {
        StatsData {
            total_visitors: history.len() as u64,
            visit_history: history,
            ..StatsData::default()
        }
    }

    #[test]
    fn overlapping_histories_converge_to_their_union() {
        let server_history: Vec<_> = (1..=5).map(|d| visit(d, 9, "10.0.0.1")).collect();
        // three of the client's eight visits are already on the server
        let client: Vec<_> = (3..=10).map(|d| visit(d, 12, "10.0.0.1")).collect();
        let mut data = server_with(server_history);

        let first = reconcile(&mut data, client, Tz::UTC);

        assert_eq!(data.total_visitors, 10);
        assert_eq!(data.visit_history.len(), 10);
        assert_eq!(first.merged_from_client, 5);
        assert_eq!(first.discarded, 3);
        assert!(first.changed);

        let returned = data.visit_history.clone();
        let second = reconcile(&mut data, returned, Tz::UTC);
        assert!(!second.changed);
        assert_eq!(second.merged_from_client, 0);
        assert_eq!(data.total_visitors, 10);
    }

    #[test]
    fn repeating_with_the_same_client_history_is_a_no_op() {
        let client = vec![visit(1, 9, "a"), visit(1, 10, "b"), visit(2, 9, "a")];
        let mut data = server_with(vec![visit(1, 11, "a")]);

        reconcile(&mut data, client.clone(), Tz::UTC);
        let after_first = data.clone();
        let second = reconcile(&mut data, client, Tz::UTC);

        assert!(!second.changed);
        assert_eq!(data, after_first);
        // the earlier client row replaced the later server row for (day 1, a)
        assert_eq!(data.visit_history[0].timestamp, "2025-03-01T09:00:00.000Z");
    }

    #[test]
    fn counter_gap_is_reported_not_filled() {
        let mut data = server_with(vec![visit(1, 9, "a"), visit(2, 9, "a")]);
        data.total_visitors = 7;

        let outcome = reconcile(&mut data, vec![visit(3, 9, "a")], Tz::UTC);

        assert_eq!(data.total_visitors, 7);
        assert_eq!(data.visit_history.len(), 3);
        assert_eq!(outcome.unexplained_gap, 4);
        assert!(outcome.is_conflict());
    }

    #[test]
    fn total_never_decreases() {
        let mut data = server_with(vec![visit(1, 9, "a"), visit(1, 10, "a")]);
        data.total_visitors = 2;

        reconcile(&mut data, Vec::new(), Tz::UTC);

        assert_eq!(data.visit_history.len(), 1);
        assert_eq!(data.total_visitors, 2);
    }

    #[test]
    fn invalid_client_rows_are_indexed_by_client_position() {
        let mut data = server_with(vec![visit(1, 9, "a")]);
        let client = vec![
            visit(2, 9, "b"),
            VisitRecord {
                timestamp: "not a date".to_string(),
                identity: "c".to_string(),
                ..VisitRecord::default()
            },
        ];

        let outcome = reconcile(&mut data, client, Tz::UTC);

        assert_eq!(outcome.invalid.len(), 1);
        assert_eq!(outcome.invalid[0].index, 1);
        assert_eq!(data.total_visitors, 2);
    }

    #[test]
    fn unreadable_server_rows_survive_and_are_reported() {
        let stored: StatsData = serde_json::from_value(serde_json::json!({
            "totalVisitors": 3,
            "visitHistory": [
                { "timestamp": "2025-03-01T09:00:00.000Z", "ip": "10.0.0.1", "page": "portfolio" },
                { "timestamp": "2025-03-01T10:00:00.000Z", "identity": "10.0.0.2" },
                { "timestamp": "garbled", "identity": "10.0.0.3" },
            ]
        }))
        .unwrap();
        let mut data = stored.clone();

        let outcome = reconcile(&mut data, Vec::new(), Tz::UTC);

        assert_eq!(data.visit_history.len(), 3);
        assert_eq!(data.visit_history[0].identity, "10.0.0.1");
        assert_eq!(data.visit_history[2].timestamp, "garbled");
        assert_eq!(outcome.unreadable_server_rows.len(), 1);
        assert_eq!(outcome.unreadable_server_rows[0].index, 2);
        assert!(outcome.invalid.is_empty());
        assert!(!outcome.changed);
        assert_eq!(data, stored);

        let again = reconcile(&mut data, Vec::new(), Tz::UTC);
        assert!(!again.changed);
        assert_eq!(data.visit_history.len(), 3);
    }
}

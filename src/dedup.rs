//! Collapse the append-only assessment log to one authoritative row per request.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::records::AssessmentLogRecord;

/// Keep the latest assessment per `request_id`.
///
/// Latest means maximum `timestamp`; on an identical timestamp the row that
/// arrives later in `log` wins. Output is ordered by `request_id`, so running
/// this over its own output returns it unchanged.
pub fn dedup_assessments(log: Vec<AssessmentLogRecord>) -> Vec<AssessmentLogRecord> {
    let total = log.len();
    let mut latest: BTreeMap<String, AssessmentLogRecord> = BTreeMap::new();

    for rec in log {
        let superseded = latest
            .get(&rec.request_id)
            .is_some_and(|seen| seen.timestamp > rec.timestamp);
        if superseded {
            debug!(
                "request_id {}: discarded older assessment at {}",
                rec.request_id, rec.timestamp
            );
        } else {
            latest.insert(rec.request_id.clone(), rec);
        }
    }

    info!(
        "Deduplicated {} assessment rows into {} requests",
        total,
        latest.len()
    );
    latest.into_values().collect()
}

//! Left-join request logs with deduplicated feedback and derive the expected
//! answer/context for each request.

use std::collections::{HashMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::records::{AssessmentLogRecord, ContextRef, EvaluationRecord, Rating, RequestLogRecord};

/// A request-log row with its feedback attached. All source columns are kept
/// for tracing; [`CandidateRow::project`] picks the evaluation-set subset.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub log: RequestLogRecord,
    pub assessment: Option<AssessmentLogRecord>,
    pub expected_response: Option<String>,
    pub expected_retrieved_context: Vec<ContextRef>,
    pub is_correct: Option<bool>,
}

impl CandidateRow {
    pub fn project(&self) -> EvaluationRecord {
        EvaluationRecord {
            request: self.log.request.clone(),
            request_id: Some(self.log.request_id.clone()),
            expected_response: self.expected_response.clone(),
            expected_response_context: None,
            expected_retrieved_context: self.expected_retrieved_context.clone(),
            source_user: self.log.source_user.clone(),
            source_tag: self.log.source_tag.clone(),
            source_chunk_id: None,
        }
    }
}

/// `assessments` must already be deduplicated (one row per `request_id`).
/// Feedback whose `request_id` has no request-log row is dropped.
pub fn synthesize(
    requests: Vec<RequestLogRecord>,
    assessments: Vec<AssessmentLogRecord>,
) -> Vec<CandidateRow> {
    let by_id: HashMap<String, AssessmentLogRecord> = assessments
        .into_iter()
        .map(|a| (a.request_id.clone(), a))
        .collect();

    let known: HashSet<&str> = requests.iter().map(|r| r.request_id.as_str()).collect();
    let orphaned = by_id.keys().filter(|id| !known.contains(id.as_str())).count();
    if orphaned > 0 {
        warn!("{orphaned} assessments reference requests missing from the request log; dropped");
    }

    let rows: Vec<CandidateRow> = requests
        .into_iter()
        .map(|log| {
            // get, not remove: a duplicated request row still sees its feedback
            let assessment = by_id.get(&log.request_id).cloned();
            derive(log, assessment)
        })
        .collect();

    let with_feedback = rows.iter().filter(|r| r.assessment.is_some()).count();
    info!(
        "Synthesized {} candidate rows ({} with feedback)",
        rows.len(),
        with_feedback
    );
    rows
}

fn derive(log: RequestLogRecord, assessment: Option<AssessmentLogRecord>) -> CandidateRow {
    let (expected_response, expected_retrieved_context, is_correct) = match &assessment {
        None => (None, Vec::new(), None),
        Some(a) => {
            let context = flagged_context(&log, a);
            match a.rating {
                Rating::ThumbsUp => (
                    Some(a.edited_response.clone().unwrap_or_else(|| log.response.clone())),
                    context,
                    Some(true),
                ),
                Rating::ThumbsDown => (a.edited_response.clone(), context, Some(false)),
                // no polarity: only chunk flags count
                Rating::Unrated => (None, context, None),
            }
        }
    };

    CandidateRow {
        log,
        assessment,
        expected_response,
        expected_retrieved_context,
        is_correct,
    }
}

// flagged chunks the request actually retrieved; anything else is logged and dropped
fn flagged_context(log: &RequestLogRecord, assessment: &AssessmentLogRecord) -> Vec<ContextRef> {
    let retrieved: HashSet<&str> = log
        .retrieved_context
        .iter()
        .map(|chunk| chunk.doc_uri.as_str())
        .collect();
    let (kept, unknown): (Vec<&String>, Vec<&String>) = assessment
        .flagged_chunks
        .iter()
        .partition(|uri| retrieved.contains(uri.as_str()));
    if !unknown.is_empty() {
        warn!(
            "request_id {}: {} flagged chunk(s) not in retrieved_context, ignored: {:?}",
            log.request_id,
            unknown.len(),
            unknown
        );
    }
    kept.into_iter()
        .map(|uri| ContextRef::from(uri.as_str()))
        .collect()
}

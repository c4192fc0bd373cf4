//! Row shapes for the log tables, the chunk table and the evaluation set.
//!
//! Source rows keep any column they don't name in a flattened `extra` map, so
//! platform bookkeeping columns survive a read → synthesize → dump cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub doc_uri: String,
    #[serde(default, alias = "content")]
    pub chunk_text: String,
}

/// `{"doc_uri": ...}` entry of an expected retrieved context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextRef {
    pub doc_uri: String,
}

impl From<&str> for ContextRef {
    fn from(doc_uri: &str) -> Self {
        Self { doc_uri: doc_uri.to_string() }
    }
}

// one row per user interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub request_id: String,
    pub request: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub retrieved_context: Vec<RetrievedChunk>,
    #[serde(default)]
    pub trace: Value,
    #[serde(default)]
    pub source_user: Option<String>,
    #[serde(default)]
    pub source_tag: Option<String>,

    #[serde(flatten)]
    pub extra: JsonMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    #[serde(alias = "positive")]
    ThumbsUp,
    #[serde(alias = "negative")]
    ThumbsDown,
    #[default]
    #[serde(rename = "none")]
    Unrated,
}

// append-only; several rows per request_id over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentLogRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub edited_response: Option<String>,
    #[serde(default)]
    pub flagged_chunks: BTreeSet<String>,

    #[serde(flatten)]
    pub extra: JsonMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    #[serde(alias = "path")]
    pub doc_uri: String,
    pub chunked_text: String,

    #[serde(flatten)]
    pub extra: JsonMap<String, Value>,
}

/// One question parsed out of a model completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub request: String,
    pub expected_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_response_context: Option<String>,
    pub expected_retrieved_context: Vec<ContextRef>,
}

/// A row of the persisted evaluation set. Log-derived rows carry
/// `request_id`/`source_user`/`source_tag`; generated rows carry `source_chunk_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_response_context: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub expected_retrieved_context: Vec<ContextRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chunk_id: Option<String>,
}

// schema evolution back-fills absent columns with null
fn null_as_empty<'de, D>(de: D) -> Result<Vec<ContextRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ContextRef>>::deserialize(de)?.unwrap_or_default())
}

impl EvaluationRecord {
    pub fn from_generated(question: GeneratedQuestion, chunk_id: &str) -> Self {
        Self {
            request: question.request,
            request_id: None,
            expected_response: Some(question.expected_response),
            expected_response_context: question.expected_response_context,
            expected_retrieved_context: question.expected_retrieved_context,
            source_user: None,
            source_tag: None,
            source_chunk_id: Some(chunk_id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_log_keeps_unknown_columns() {
        let row = json!({
            "request_id": "r1",
            "request": "capital of France?",
            "response": "Paris",
            "retrieved_context": [{"doc_uri": "a.pdf", "content": "Paris is..."}],
            "source_user": "jane",
            "databricks_request_id": "abc",
            "timestamp_ms": 1712
        });
        let rec: RequestLogRecord = serde_json::from_value(row).unwrap();
        assert_eq!(rec.retrieved_context[0].chunk_text, "Paris is...");
        assert_eq!(rec.extra["databricks_request_id"], "abc");
        assert_eq!(rec.source_tag, None);
    }

    #[test]
    fn rating_accepts_polarity_aliases() {
        let up: Rating = serde_json::from_value(json!("positive")).unwrap();
        let down: Rating = serde_json::from_value(json!("thumbs_down")).unwrap();
        let none: Rating = serde_json::from_value(json!("none")).unwrap();
        assert_eq!((up, down, none), (Rating::ThumbsUp, Rating::ThumbsDown, Rating::Unrated));
    }

    #[test]
    fn chunk_reads_path_as_doc_uri() {
        let chunk: DocumentChunk = serde_json::from_value(json!({
            "chunk_id": "c1",
            "path": "/Volumes/main/rag/docs/a.pdf",
            "chunked_text": "text",
            "parser_status": "SUCCESS"
        }))
        .unwrap();
        assert_eq!(chunk.doc_uri, "/Volumes/main/rag/docs/a.pdf");
        assert_eq!(chunk.extra["parser_status"], "SUCCESS");
    }

    #[test]
    fn evolved_row_reads_back() {
        let rec: EvaluationRecord = serde_json::from_value(json!({
            "request": "legacy",
            "request_id": "r0",
            "expected_response": null,
            "expected_retrieved_context": null,
            "source_chunk_id": null
        }))
        .unwrap();
        assert!(rec.expected_retrieved_context.is_empty());
        assert_eq!(rec.source_chunk_id, None);
    }

    #[test]
    fn generated_record_omits_log_columns() {
        let q = GeneratedQuestion {
            request: "q".into(),
            expected_response: "a".into(),
            expected_response_context: Some("snippet".into()),
            expected_retrieved_context: vec![ContextRef::from("a.pdf")],
        };
        let value = serde_json::to_value(EvaluationRecord::from_generated(q, "c7")).unwrap();
        assert_eq!(
            value,
            json!({
                "request": "q",
                "expected_response": "a",
                "expected_response_context": "snippet",
                "expected_retrieved_context": [{"doc_uri": "a.pdf"}],
                "source_chunk_id": "c7"
            })
        );
    }
}

//! Union log-derived and generated records and persist them as the evaluation set.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::info;
use serde_json::Value;

use crate::records::EvaluationRecord;
use crate::store::TableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WriteMode {
    /// Replace the table with this run's rows
    Overwrite,
    /// Upsert this run's rows into what is already there
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub rows_written: usize,
    pub replaced: usize,
    pub added: usize,
    /// Stale generated rows dropped because their chunk came back with fewer questions
    pub removed: usize,
}

pub fn union_records(
    from_logs: Vec<EvaluationRecord>,
    generated: Vec<EvaluationRecord>,
) -> Vec<EvaluationRecord> {
    let mut all = from_logs;
    all.extend(generated);
    all
}

// request_id for log rows, (chunk, request) for generated rows
fn row_key(row: &Value) -> String {
    let field = |name: &str| row.get(name).and_then(Value::as_str);
    match (field("request_id"), field("source_chunk_id")) {
        (Some(id), _) => format!("request_id:{id}"),
        (None, Some(chunk)) => format!("chunk:{chunk}:{}", field("request").unwrap_or_default()),
        (None, None) => format!("request:{}", field("request").unwrap_or_default()),
    }
}

// source chunk of a generated row; log rows have none
fn generated_chunk(row: &Value) -> Option<&str> {
    match row.get("request_id").and_then(Value::as_str) {
        Some(_) => None,
        None => row.get("source_chunk_id").and_then(Value::as_str),
    }
}

/// Merge `incoming` into `existing`.
///
/// Log rows are upserted by `request_id`: matches are replaced in place, new
/// ids appended. Generated rows are swapped per chunk: every existing row of a
/// chunk present in `incoming` is dropped and the chunk's new rows appended.
fn merge_rows(existing: Vec<Value>, incoming: Vec<Value>) -> (Vec<Value>, WriteSummary) {
    let mut fresh: HashMap<String, usize> = HashMap::new();
    for chunk in incoming.iter().filter_map(generated_chunk) {
        *fresh.entry(chunk.to_string()).or_default() += 1;
    }

    let mut stale: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Value> = existing
        .into_iter()
        .filter(|row| match generated_chunk(row) {
            Some(chunk) if fresh.contains_key(chunk) => {
                *stale.entry(chunk.to_string()).or_default() += 1;
                false
            }
            _ => true,
        })
        .collect();

    let mut summary = WriteSummary::default();
    for (chunk, &old) in &stale {
        let new = fresh.get(chunk).copied().unwrap_or_default();
        summary.replaced += old.min(new);
        summary.removed += old.saturating_sub(new);
    }
    let swapped = summary.replaced;

    let mut index: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (row_key(r), i))
        .collect();
    let kept_len = rows.len();
    let mut appended = 0;

    for row in incoming {
        let key = row_key(&row);
        match index.get(&key).copied() {
            Some(i) => {
                if i < kept_len {
                    summary.replaced += 1;
                }
                rows[i] = row;
            }
            None => {
                index.insert(key, rows.len());
                rows.push(row);
                appended += 1;
            }
        }
    }
    summary.added = appended - swapped.min(appended);
    summary.rows_written = rows.len();
    (rows, summary)
}

/// Give every row the union of all columns, missing ones as null, so an
/// older table picks up new optional columns instead of rejecting them.
fn evolve_schema(rows: &mut [Value]) {
    let columns: BTreeSet<String> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|obj| obj.keys().cloned())
        .collect();

    for obj in rows.iter_mut().filter_map(Value::as_object_mut) {
        for col in &columns {
            obj.entry(col.clone()).or_insert(Value::Null);
        }
    }
}

pub fn write_evaluation_set<S>(
    store: &S,
    fqn: &str,
    records: &[EvaluationRecord],
    mode: WriteMode,
) -> Result<WriteSummary>
where
    S: TableStore + ?Sized,
{
    let incoming = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .context("serialising evaluation records")?;

    let (mut rows, summary) = match mode {
        WriteMode::Merge if store.table_exists(fqn) => {
            let existing = store.read_rows(fqn)?;
            merge_rows(existing, incoming)
        }
        _ => {
            let summary = WriteSummary {
                rows_written: incoming.len(),
                added: incoming.len(),
                ..WriteSummary::default()
            };
            (incoming, summary)
        }
    };

    evolve_schema(&mut rows);
    store
        .replace_rows(fqn, &rows)
        .with_context(|| format!("writing evaluation set {fqn}"))?;

    info!(
        "Wrote {} rows to {} ({:?}: {} replaced, {} added, {} removed)",
        rows.len(),
        fqn,
        mode,
        summary.replaced,
        summary.added,
        summary.removed
    );
    Ok(summary)
}

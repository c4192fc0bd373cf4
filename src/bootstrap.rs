//! The end-to-end run: logs → dedup → synthesize → [generate] → write.

use anyhow::{Context, Result};
use log::info;

use crate::config::{AppConfig, GenerationSettings};
use crate::dedup::dedup_assessments;
use crate::discovery::LogTables;
use crate::generate::{generate_golden, sample_chunks, GenerationReport};
use crate::model::ModelEndpoint;
use crate::records::{AssessmentLogRecord, DocumentChunk, EvaluationRecord, RequestLogRecord};
use crate::store::{read_table, TableStore};
use crate::synthesize::{synthesize, CandidateRow};
use crate::writer::{union_records, write_evaluation_set, WriteMode, WriteSummary};

/// Golden-question generation is opt-in.
pub struct Golden<'a> {
    pub model: &'a dyn ModelEndpoint,
    pub settings: &'a GenerationSettings,
}

#[derive(Debug)]
pub struct BootstrapReport {
    pub candidates: Vec<CandidateRow>,
    pub generation: Option<GenerationReport>,
    pub write: WriteSummary,
}

impl BootstrapReport {
    pub fn generated_count(&self) -> usize {
        self.generation.as_ref().map_or(0, |g| g.records.len())
    }
}

pub async fn run_bootstrap<S>(
    config: &AppConfig,
    store: &S,
    tables: &LogTables,
    golden: Option<Golden<'_>>,
    mode: WriteMode,
) -> Result<BootstrapReport>
where
    S: TableStore + ?Sized,
{
    let assessments: Vec<AssessmentLogRecord> = read_table(store, &tables.assessment_logs)
        .context("loading assessment logs")?;
    let requests: Vec<RequestLogRecord> =
        read_table(store, &tables.request_logs).context("loading request logs")?;
    info!(
        "Loaded {} request rows and {} assessment rows",
        requests.len(),
        assessments.len()
    );

    let candidates = synthesize(requests, dedup_assessments(assessments));
    let from_logs: Vec<EvaluationRecord> = candidates.iter().map(CandidateRow::project).collect();

    let generation = match golden {
        None => None,
        Some(Golden { model, settings }) => {
            let chunks: Vec<DocumentChunk> = read_table(store, &config.chunked_docs_table)
                .context("loading chunked documents")?;
            let sampled = sample_chunks(chunks, settings.sample_size, settings.sample_seed);
            info!(
                "Sampled {} chunks (seed {}) from {}",
                sampled.len(),
                settings.sample_seed,
                config.chunked_docs_table
            );
            Some(generate_golden(model, &sampled, settings.questions_per_chunk).await?)
        }
    };

    let generated = generation
        .as_ref()
        .map(|g| g.records.clone())
        .unwrap_or_default();
    let records = union_records(from_logs, generated);
    let write = write_evaluation_set(store, &config.evaluation_set_fqn, &records, mode)?;

    Ok(BootstrapReport {
        candidates,
        generation,
        write,
    })
}

//! Golden-question generation: prompt the model once per sampled chunk, keep
//! whatever parses, log and skip whatever doesn't.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;

use crate::model::ModelEndpoint;
use crate::records::{ContextRef, DocumentChunk, EvaluationRecord, GeneratedQuestion};

// How often to emit log lines during the chunk loop
const LOG_EVERY_N: usize = 10;

const GOLDEN_PROMPT_TEMPLATE: &str = r#"Write substantive evaluation questions that test whether a RAG system understands the key concepts, methods and findings in the context below. Skip superficial details such as section titles or page numbers.

Document URI: {doc_uri}
Context: {context}

Create {num_questions} questions that:
1. Focus on core technical concepts
2. Ask about quantitative results and comparisons
3. Probe implementation details and design choices
4. Need several pieces of the context combined to answer
5. Are not trivial factual lookups

Good example:
{
    "request": "Which scheduling change lets the system overlap communication with computation, and what does it save?",
    "expected_response": "Splitting each batch into micro-batches on a bidirectional pipeline hides most all-to-all communication behind compute, which removes the pipeline bubbles that dominated training time.",
    "expected_retrieved_context": [
        {"doc_uri": "{doc_uri}"}
    ]
}

Bad example (avoid):
{
    "request": "What is the title of section 3.2.1?",
    "expected_response": "Pipeline Scheduling"
}

Respond in strict JSON, exactly this shape:
{
    "questions": [
        {
            "request": "question about a key concept",
            "expected_response": "answer that requires understanding the context",
            "expected_response_context": "exact snippet from the context that contains the answer",
            "expected_retrieved_context": [
                {"doc_uri": "{doc_uri}"}
            ]
        }
    ]
}

Requirements:
- Copy the supporting snippet verbatim into 'expected_response_context'
- Answers must show understanding of the context, not just copy it
- JSON only, no markdown fences or extra text"#;

pub fn build_prompt(chunk: &DocumentChunk, num_questions: usize) -> String {
    let num_questions = num_questions.to_string();
    fill_template(GOLDEN_PROMPT_TEMPLATE, |name| match name {
        "doc_uri" => Some(chunk.doc_uri.as_str()),
        "num_questions" => Some(num_questions.as_str()),
        "context" => Some(chunk.chunked_text.as_str()),
        _ => None,
    })
}

/// Single pass over `template`: `{name}` is replaced when `lookup` knows the
/// name, every other brace is copied. Substituted text is never rescanned.
fn fill_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| lookup(&after[..close]).map(|v| (v, close)));
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("invalid response format: missing 'questions' key")]
    MissingQuestions,

    #[error("'questions' must be a list")]
    QuestionsNotList,

    #[error("question {index} is not an object")]
    QuestionNotObject { index: usize },

    #[error("question {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("question {index}: '{field}' must be {expected}")]
    WrongType {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },
}

/// Strictly validate a completion. One bad question rejects the whole
/// response; malformed output is expected, so it comes back as a value.
pub fn parse_questions(response: &str) -> Result<Vec<GeneratedQuestion>, ValidationError> {
    let parsed: Value = serde_json::from_str(response.trim())
        .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

    let questions = parsed
        .as_object()
        .and_then(|obj| obj.get("questions"))
        .ok_or(ValidationError::MissingQuestions)?
        .as_array()
        .ok_or(ValidationError::QuestionsNotList)?;

    questions
        .iter()
        .enumerate()
        .map(|(index, q)| parse_question(index, q))
        .collect()
}

fn parse_question(index: usize, q: &Value) -> Result<GeneratedQuestion, ValidationError> {
    let obj = q
        .as_object()
        .ok_or(ValidationError::QuestionNotObject { index })?;

    let text_field = |field: &'static str| -> Result<String, ValidationError> {
        let v = obj
            .get(field)
            .ok_or(ValidationError::MissingField { index, field })?;
        v.as_str()
            .map(str::to_string)
            .ok_or(ValidationError::WrongType { index, field, expected: "a string" })
    };

    let request = text_field("request")?;
    let expected_response = text_field("expected_response")?;

    let expected_response_context = match obj.get("expected_response_context") {
        None | Some(Value::Null) => None,
        Some(_) => Some(text_field("expected_response_context")?),
    };

    let field = "expected_retrieved_context";
    let wrong_context = ValidationError::WrongType {
        index,
        field,
        expected: "a list of {\"doc_uri\": ...} objects",
    };
    let expected_retrieved_context = obj
        .get(field)
        .ok_or(ValidationError::MissingField { index, field })?
        .as_array()
        .ok_or_else(|| wrong_context.clone())?
        .iter()
        .map(|entry| {
            entry
                .get("doc_uri")
                .and_then(Value::as_str)
                .map(ContextRef::from)
                .ok_or_else(|| wrong_context.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GeneratedQuestion {
        request,
        expected_response,
        expected_response_context,
        expected_retrieved_context,
    })
}

/// Deterministic fixed-size sample; chunks keep their source order.
pub fn sample_chunks(chunks: Vec<DocumentChunk>, n: usize, seed: u64) -> Vec<DocumentChunk> {
    if chunks.len() <= n {
        return chunks;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, chunks.len(), n).into_vec();
    picked.sort_unstable();

    let mut slots: Vec<Option<DocumentChunk>> = chunks.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub reason: ValidationError,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub chunks_processed: usize,
    pub records: Vec<EvaluationRecord>,
    pub failures: Vec<ChunkFailure>,
}

/// One sequential model call per chunk. Validation failures are recorded and
/// the chunk is skipped; an endpoint/transport error aborts the run.
pub async fn generate_golden<M>(
    model: &M,
    chunks: &[DocumentChunk],
    questions_per_chunk: usize,
) -> Result<GenerationReport>
where
    M: ModelEndpoint + ?Sized,
{
    let bar = ProgressBar::new(chunks.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    )?);

    let mut report = GenerationReport::default();

    for chunk in chunks {
        report.chunks_processed += 1;
        if report.chunks_processed % LOG_EVERY_N == 0 {
            info!("Processing chunk {} ({})", report.chunks_processed, chunk.chunk_id);
        }

        let prompt = build_prompt(chunk, questions_per_chunk);
        let response = model.complete(&prompt).await?;

        match parse_questions(&response) {
            Ok(questions) => {
                report.records.extend(
                    questions
                        .into_iter()
                        .map(|q| EvaluationRecord::from_generated(q, &chunk.chunk_id)),
                );
            }
            Err(reason) => {
                warn!("Error processing chunk {}: {}", chunk.chunk_id, reason);
                report.failures.push(ChunkFailure {
                    chunk_id: chunk.chunk_id.clone(),
                    reason,
                });
            }
        }
        bar.inc(1);
    }
    bar.finish_with_message("done");

    info!(
        "Generated {} evaluation questions from {} chunks ({} failed)",
        report.records.len(),
        report.chunks_processed,
        report.failures.len()
    );
    Ok(report)
}

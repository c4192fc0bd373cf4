use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rag_evalset::{
    bootstrap::{run_bootstrap, Golden},
    config::{AppConfig, GenerationSettings, SeedParams},
    discovery::{resolve_log_tables, ManifestWorkspace},
    model::ModelEndpoint,
    records::EvaluationRecord,
    store::{read_table, JsonDirStore, TableStore},
    writer::WriteMode,
};
use serde_json::{json, Value};

// Replies in call order; counts prompts it has seen
struct QueuedModel {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl QueuedModel {
    fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelEndpoint for QueuedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("model called more often than scripted"))
    }
}

fn config() -> AppConfig {
    AppConfig::resolve(&SeedParams {
        user_email: "jane.doe@example.com".into(),
        app_name: "docs_rag".into(),
        catalog: "main".into(),
        schema: "rag".into(),
    })
    .unwrap()
}

fn workspace() -> ManifestWorkspace {
    serde_json::from_value(json!({
        "deployments": [{ "model_name": "main.rag.docs_rag", "endpoint_name": "agents_docs_rag" }],
        "endpoints": [{
            "name": "agents_docs_rag",
            "config": { "auto_capture_config": {
                "catalog_name": "main",
                "schema_name": "rag",
                "state": { "payload_table": { "name": "docs_rag_payload" } }
            }}
        }]
    }))
    .unwrap()
}

fn seed_tables(store: &JsonDirStore, cfg: &AppConfig) {
    let request = |id: &str, q: &str, a: &str| {
        json!({
            "request_id": id,
            "request": q,
            "response": a,
            "retrieved_context": [{ "doc_uri": "/docs/geo.pdf", "content": "France..." }],
            "trace": { "spans": [] },
            "source_user": "reviewer@example.com",
            "source_tag": "review_app",
            "databricks_request_id": format!("dbx-{id}")
        })
    };
    store
        .replace_rows(
            "main.rag.`docs_rag_payload_request_logs`",
            &[
                request("r1", "Capital of France?", "Paris"),
                request("r2", "Second city of France?", "Paris"),
                request("r3", "Capital of Spain?", "Lisbon"),
                request("r4", "Capital of Italy?", "Rome"),
            ],
        )
        .unwrap();

    store
        .replace_rows(
            "main.rag.`docs_rag_payload_assessment_logs`",
            &[
                json!({"request_id": "r1", "timestamp": "2024-07-01T10:00:00Z", "rating": "thumbs_down"}),
                json!({"request_id": "r1", "timestamp": "2024-07-01T11:00:00Z", "rating": "thumbs_up",
                       "flagged_chunks": ["/docs/geo.pdf"]}),
                json!({"request_id": "r2", "timestamp": "2024-07-01T10:00:00Z", "rating": "thumbs_down",
                       "edited_response": "Lyon, not Paris"}),
                json!({"request_id": "r3", "timestamp": "2024-07-01T10:00:00Z", "rating": "negative"}),
                json!({"request_id": "ghost", "timestamp": "2024-07-01T10:00:00Z", "rating": "thumbs_up"}),
            ],
        )
        .unwrap();

    let chunks: Vec<Value> = (1..=3)
        .map(|i| {
            json!({
                "chunk_id": format!("c{i}"),
                "path": format!("/docs/doc{i}.pdf"),
                "chunked_text": format!("body of document {i}"),
                "doc_parsed_contents": {}
            })
        })
        .collect();
    store.replace_rows(&cfg.chunked_docs_table, &chunks).unwrap();
}

fn questions(doc_uri: &str) -> String {
    questions_asking(doc_uri, "argue")
}

fn questions_asking(doc_uri: &str, verb: &str) -> String {
    json!({
        "questions": [{
            "request": format!("What does {doc_uri} {verb}?"),
            "expected_response": "Something substantive.",
            "expected_response_context": "body of document",
            "expected_retrieved_context": [{ "doc_uri": doc_uri }]
        }]
    })
    .to_string()
}

fn by_id<'a>(rows: &'a [EvaluationRecord], id: &str) -> &'a EvaluationRecord {
    rows.iter()
        .find(|r| r.request_id.as_deref() == Some(id))
        .unwrap()
}

#[tokio::test]
async fn feedback_only_run_builds_policy_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path()).unwrap();
    let cfg = config();
    seed_tables(&store, &cfg);

    let tables = resolve_log_tables(&workspace(), &cfg.uc_model_name).unwrap();
    let report = run_bootstrap(&cfg, &store, &tables, None, WriteMode::Overwrite)
        .await
        .unwrap();

    assert_eq!(report.candidates.len(), 4);
    assert_eq!(report.generated_count(), 0);
    assert_eq!(report.write.rows_written, 4);
    assert_eq!(report.candidates[0].log.extra["databricks_request_id"], json!("dbx-r1"));

    let rows: Vec<EvaluationRecord> = read_table(&store, &cfg.evaluation_set_fqn).unwrap();
    assert!(rows.iter().all(|r| r.request_id.as_deref() != Some("ghost")));

    let r1 = by_id(&rows, "r1");
    assert_eq!(r1.expected_response.as_deref(), Some("Paris"));
    assert_eq!(r1.expected_retrieved_context.len(), 1);
    assert_eq!(r1.source_tag.as_deref(), Some("review_app"));
    assert_eq!(by_id(&rows, "r2").expected_response.as_deref(), Some("Lyon, not Paris"));
    assert_eq!(by_id(&rows, "r3").expected_response, None);
    assert_eq!(by_id(&rows, "r4").expected_response, None);
    assert!(by_id(&rows, "r4").expected_retrieved_context.is_empty());
}

#[tokio::test]
async fn golden_questions_survive_one_bad_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path()).unwrap();
    let cfg = config();
    seed_tables(&store, &cfg);
    let tables = resolve_log_tables(&workspace(), &cfg.uc_model_name).unwrap();

    // sample covers all three chunks, so calls follow source order
    let model = QueuedModel::new(vec![
        questions("/docs/doc1.pdf"),
        "{\"questions\": [{\"request\": \"half a question\"".to_string(),
        questions("/docs/doc3.pdf"),
    ]);
    let settings = GenerationSettings {
        sample_size: 10,
        ..GenerationSettings::default()
    };
    let golden = Golden {
        model: &model,
        settings: &settings,
    };

    let report = run_bootstrap(&cfg, &store, &tables, Some(golden), WriteMode::Overwrite)
        .await
        .unwrap();

    let generation = report.generation.as_ref().unwrap();
    assert_eq!(generation.chunks_processed, 3);
    assert_eq!(generation.failures.len(), 1);
    assert_eq!(generation.failures[0].chunk_id, "c2");
    assert_eq!(report.generated_count(), 2);
    assert_eq!(report.write.rows_written, 6);

    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("Create 2 questions"));
    assert!(prompts[2].contains("body of document 3"));

    let rows: Vec<EvaluationRecord> = read_table(&store, &cfg.evaluation_set_fqn).unwrap();
    let chunk_ids: Vec<_> = rows
        .iter()
        .filter_map(|r| r.source_chunk_id.as_deref())
        .collect();
    assert_eq!(chunk_ids, vec!["c1", "c3"]);
    assert!(rows
        .iter()
        .filter(|r| r.source_chunk_id.is_some())
        .all(|r| r.expected_response_context.as_deref() == Some("body of document")));
}

#[tokio::test]
async fn merge_rerun_replaces_regenerated_questions() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path()).unwrap();
    let cfg = config();
    seed_tables(&store, &cfg);
    let tables = resolve_log_tables(&workspace(), &cfg.uc_model_name).unwrap();
    let settings = GenerationSettings {
        sample_size: 10,
        ..GenerationSettings::default()
    };

    for verb in ["argue", "claim"] {
        let model = QueuedModel::new(
            (1..=3)
                .map(|i| questions_asking(&format!("/docs/doc{i}.pdf"), verb))
                .collect(),
        );
        let golden = Golden {
            model: &model,
            settings: &settings,
        };
        run_bootstrap(&cfg, &store, &tables, Some(golden), WriteMode::Merge)
            .await
            .unwrap();
    }

    let rows: Vec<EvaluationRecord> = read_table(&store, &cfg.evaluation_set_fqn).unwrap();
    assert_eq!(rows.len(), 7);
    let generated: Vec<_> = rows.iter().filter(|r| r.source_chunk_id.is_some()).collect();
    assert_eq!(generated.len(), 3);
    assert!(generated.iter().all(|r| r.request.ends_with("claim?")));
}

#[tokio::test]
async fn rerunning_does_not_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path()).unwrap();
    let cfg = config();
    seed_tables(&store, &cfg);
    let tables = resolve_log_tables(&workspace(), &cfg.uc_model_name).unwrap();

    for mode in [WriteMode::Overwrite, WriteMode::Overwrite, WriteMode::Merge] {
        run_bootstrap(&cfg, &store, &tables, None, mode).await.unwrap();
    }

    let rows = store.read_rows(&cfg.evaluation_set_fqn).unwrap();
    assert_eq!(rows.len(), 4);
}

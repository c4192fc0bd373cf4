/*
Feedback only, log tables discovered through the workspace manifest:
cargo run --release --bin bootstrap_eval_set -- \
    --config global_config.yaml \
    --tables-dir data/tables \
    --workspace data/workspace.json

With golden questions, merging into an existing evaluation set:
cargo run --release --bin bootstrap_eval_set -- \
    --config global_config.yaml \
    --tables-dir data/tables \
    --request-log-table 'main.rag.`docs_rag_payload_request_logs`' \
    --assessment-log-table 'main.rag.`docs_rag_payload_assessment_logs`' \
    --generate --sample-size 50 --questions-per-chunk 2 \
    --mode merge \
    --dump-candidates out/candidates.json
*/

use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rag_evalset::{
    bootstrap::{run_bootstrap, Golden},
    config::{AppConfig, GenerationSettings},
    discovery::{resolve_log_tables, LogTables, ManifestWorkspace},
    model::{GenerationParams, ServingEndpointClient},
    store::JsonDirStore,
    writer::WriteMode,
};

#[derive(Parser, Debug)]
#[command(version, about = "Turn review-app feedback logs (and optional golden questions) into an evaluation set")]
struct Cli {
    // YAML document written by write_config
    #[arg(long, default_value = "global_config.yaml")]
    config: PathBuf,

    // Directory holding one JSON array per table
    #[arg(long, default_value = "data/tables")]
    tables_dir: PathBuf,

    // Workspace manifest used to discover the log tables
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long, requires = "assessment_log_table")]
    request_log_table: Option<String>,

    #[arg(long, requires = "request_log_table")]
    assessment_log_table: Option<String>,

    #[arg(long, value_enum, default_value_t = WriteMode::Overwrite)]
    mode: WriteMode,

    // Also generate golden questions from sampled chunks
    #[arg(long)]
    generate: bool,

    #[arg(long, default_value = "databricks-meta-llama-3-3-70b-instruct")]
    endpoint: String,

    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    #[arg(long, default_value_t = 1000)]
    max_tokens: u32,

    #[arg(long, default_value_t = 2)]
    questions_per_chunk: usize,

    #[arg(long, default_value_t = 50)]
    sample_size: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    // Overrides $DATABRICKS_HOST
    #[arg(long)]
    host: Option<String>,

    // Overrides $DATABRICKS_TOKEN
    #[arg(long)]
    token: Option<String>,

    // Write every synthesized row (all log columns + derived fields) here
    #[arg(long)]
    dump_candidates: Option<PathBuf>,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = rag_evalset::logging::init(&cli.log_dir, "bootstrap_eval_set")?;
    info!("Program started");

    let config = AppConfig::load_yaml(&cli.config)?;
    info!("Using config:\n{config}");

    let tables = match (&cli.request_log_table, &cli.assessment_log_table, &cli.workspace) {
        (Some(request_logs), Some(assessment_logs), _) => LogTables {
            request_logs: request_logs.clone(),
            assessment_logs: assessment_logs.clone(),
        },
        (_, _, Some(manifest)) => {
            let workspace = ManifestWorkspace::load(manifest)?;
            resolve_log_tables(&workspace, &config.uc_model_name)?
        }
        _ => bail!("pass --workspace or both --request-log-table and --assessment-log-table"),
    };
    println!("Assessment logs: {}", tables.assessment_logs);
    println!("Request logs: {}", tables.request_logs);

    let store = JsonDirStore::new(&cli.tables_dir)?;

    let settings = GenerationSettings {
        endpoint: cli.endpoint.clone(),
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
        questions_per_chunk: cli.questions_per_chunk,
        sample_size: cli.sample_size,
        sample_seed: cli.seed,
    };
    let client = if cli.generate {
        Some(ServingEndpointClient::from_env(
            cli.host.clone(),
            cli.token.clone(),
            &settings.endpoint,
            GenerationParams::from(&settings),
        )?)
    } else {
        None
    };
    let golden = client.as_ref().map(|model| Golden {
        model,
        settings: &settings,
    });

    let report = run_bootstrap(&config, &store, &tables, golden, cli.mode).await?;

    if let Some(path) = &cli.dump_candidates {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report.candidates)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Candidate rows written to {}", path.display());
    }

    println!("\n=== Bootstrap summary ===");
    println!("Requests from logs   : {}", report.candidates.len());
    if let Some(generation) = &report.generation {
        println!("Chunks sampled       : {}", generation.chunks_processed);
        println!("Chunks failed        : {}", generation.failures.len());
    }
    println!("Generated {} evaluation questions", report.generated_count());
    println!("Rows in {} : {}", config.evaluation_set_fqn, report.write.rows_written);
    println!("Log file             : {:?}", log_path);

    Ok(())
}

/*
cargo run --bin probe_model -- \
    --endpoint databricks-meta-llama-3-3-70b-instruct \
    --temperature 0.5 \
    --max-tokens 1000
*/

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use rag_evalset::model::{GenerationParams, ModelEndpoint, ServingEndpointClient};

#[derive(Parser, Debug)]
#[command(version, about = "Send one prompt to a serving endpoint and print the completion")]
struct Cli {
    #[arg(long, default_value = "What is the capital of France?")]
    prompt: String,

    #[arg(long, default_value = "databricks-meta-llama-3-3-70b-instruct")]
    endpoint: String,

    #[arg(long, default_value_t = 0.5)]
    temperature: f32,

    #[arg(long, default_value_t = 1000)]
    max_tokens: u32,

    // Overrides $DATABRICKS_HOST
    #[arg(long)]
    host: Option<String>,

    // Overrides $DATABRICKS_TOKEN
    #[arg(long)]
    token: Option<String>,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    rag_evalset::logging::init(&cli.log_dir, "probe_model")?;

    let params = GenerationParams {
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
    };
    let client = ServingEndpointClient::from_env(cli.host, cli.token, &cli.endpoint, params)?;

    info!("Probing {} with {:?}", cli.endpoint, params);
    let completion = client.complete(&cli.prompt).await?;
    info!("Endpoint {} answered with {} chars", cli.endpoint, completion.len());
    println!("{completion}");

    Ok(())
}

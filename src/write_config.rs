/*
cargo run --release --bin write_config -- \
    --user-email jane.doe@example.com \
    --app-name docs_rag \
    --catalog main \
    --schema rag \
    --out global_config.yaml
*/

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use rag_evalset::config::{AppConfig, SeedParams};

#[derive(Parser, Debug)]
#[command(version, about = "Resolve every app identifier from a few seeds and save them as YAML")]
struct Cli {
    #[arg(long)]
    user_email: String,

    // Names the UC model and prefixes every output table
    #[arg(long)]
    app_name: String,

    #[arg(long, default_value = "main")]
    catalog: String,

    #[arg(long)]
    schema: String,

    #[arg(long, default_value = "global_config.yaml")]
    out: PathBuf,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    rag_evalset::logging::init(&cli.log_dir, "write_config")?;

    let seed = SeedParams {
        user_email: cli.user_email,
        app_name: cli.app_name,
        catalog: cli.catalog,
        schema: cli.schema,
    };
    let config = AppConfig::resolve(&seed)?;

    println!("{config}");
    config.save_yaml(&cli.out)?;
    info!("Config for {} written to {}", config.rag_app_name, cli.out.display());
    println!("config written to {}", cli.out.display());

    Ok(())
}

//! File + terminal logging shared by the binaries.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use chrono::Local;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use time::macros::format_description;

/// Info and up to `logs/{timestamp}+{label}.log`, warnings and up to the terminal.
/// Returns the log file path.
pub fn init(log_dir: &Path, label: &str) -> Result<PathBuf> {
    fs::create_dir_all(log_dir).with_context(|| "failed to create logs directory")?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = log_dir.join(format!("{timestamp}+{label}.log"));
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file {}", log_path.display()))?;

    let config = ConfigBuilder::new()
        .set_time_format_custom(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Warn,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, config, log_file),
    ])
    .context("failed to initialise logger")?;

    Ok(log_path)
}

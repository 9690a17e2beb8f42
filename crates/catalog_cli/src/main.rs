//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the catalog from an optional JSON config and report its state.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `catalog_cli [config.json]`

use catalog_core::{core_version, default_log_level, init_logging, CatalogConfig, CatalogService};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("catalog_cli error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = match std::env::args().nth(1) {
        Some(path) => CatalogConfig::from_file(&path).map_err(|err| err.to_string())?,
        None => CatalogConfig::default(),
    };

    if let Some(log_dir) = config.log_dir.as_deref() {
        let level = config.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.display().to_string())?;
    }

    let service = CatalogService::open(&config).map_err(|err| err.to_string())?;
    let count = service.count().map_err(|err| err.to_string())?;

    println!("catalog_core health={}", service.health());
    println!("catalog_core version={}", core_version());
    println!("catalog_core records={count}");
    println!("catalog_core next_id={}", service.manager().next_id());
    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::cache::CachedDataProvider;
use crate::config::Config;
use crate::provider::AsyncDataProvider;
use crate::{backend, telemetry};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxdata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Path to the TOML configuration file")]
    pub config: PathBuf,

    #[arg(long, help = "Print the metrics snapshot after the command")]
    pub metrics: bool,

    #[arg(long, help = "Log filter, e.g. \"oxdata=debug\" (RUST_LOG takes precedence)")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "get", about = "Read the value stored under a key")]
    Get { key: String },

    #[command(name = "put", about = "Store a value under a key")]
    Put { key: String, value: String },

    #[command(name = "remove", about = "Remove a key")]
    Remove {
        key: String,

        #[arg(short, long, help = "Print the removed value")]
        print: bool,
    },

    #[command(name = "contains", about = "Check whether a key exists")]
    Contains { key: String },

    #[command(name = "keys", about = "List all keys")]
    Keys,

    #[command(name = "entries", about = "List all entries")]
    Entries {
        #[arg(short, long, help = "Output as a JSON object")]
        json: bool,
    },

    #[command(name = "size", about = "Count entries")]
    Size,
}

mod data;
mod metrics;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing("oxdata", cli.log.as_deref());

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    let provider = backend::open(&config.backend)
        .await
        .with_context(|| format!("Failed to open {} backend", config.backend.kind()))?;

    let cached =
        CachedDataProvider::<String, _>::with_config("cli", provider, config.cache.clone())
            .context("Invalid cache configuration")?;

    let mut stdout = std::io::stdout();
    let outcome = data::execute(&cli.command, &cached, &mut stdout).await;

    cached
        .executor()
        .shutdown()
        .await
        .context("Failed to shut down backend executor")?;

    if cli.metrics {
        metrics::print(&mut stdout)?;
    }

    outcome
}

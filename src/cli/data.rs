//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了读写数据的CLI子命令。

use crate::cli::Commands;
use crate::provider::AsyncDataProvider;
use anyhow::{Context, Result};
use std::io::Write;

pub async fn execute(
    command: &Commands,
    provider: &dyn AsyncDataProvider<String>,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Commands::Get { key } => {
            let value = provider
                .get(key)
                .await
                .with_context(|| format!("Failed to read '{}'", key))?;
            match value {
                Some(value) => writeln!(out, "{}", value)?,
                None => writeln!(out, "(absent)")?,
            }
        }
        Commands::Put { key, value } => {
            provider
                .put(key, value.clone())
                .await
                .with_context(|| format!("Failed to write '{}'", key))?;
            writeln!(out, "OK")?;
        }
        Commands::Remove { key, print } => {
            let removed = provider
                .get_and_remove(key)
                .await
                .with_context(|| format!("Failed to remove '{}'", key))?;
            match (print, removed) {
                (true, Some(value)) => writeln!(out, "{}", value)?,
                (true, None) => writeln!(out, "(absent)")?,
                (false, _) => writeln!(out, "OK")?,
            }
        }
        Commands::Contains { key } => {
            let present = provider.contains(key).await?;
            writeln!(out, "{}", present)?;
        }
        Commands::Keys => {
            let mut keys: Vec<_> = provider.keys().await?.into_iter().collect();
            keys.sort();
            for key in keys {
                writeln!(out, "{}", key)?;
            }
        }
        Commands::Entries { json } => {
            let entries = provider.entries().await?;
            if *json {
                let sorted: std::collections::BTreeMap<_, _> = entries.into_iter().collect();
                writeln!(out, "{}", serde_json::to_string_pretty(&sorted)?)?;
            } else {
                let mut entries: Vec<_> = entries.into_iter().collect();
                entries.sort();
                for (key, value) in entries {
                    writeln!(out, "{}\t{}", key, value)?;
                }
            }
        }
        Commands::Size => {
            writeln!(out, "{}", provider.size().await?)?;
        }
    }
    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块是数据访问命令行工具的入口点。

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    oxdata::cli::run().await
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了指标输出。

use crate::metrics::get_metrics_string;
use anyhow::Result;
use std::io::Write;

pub fn print(out: &mut impl Write) -> Result<()> {
    let metrics = get_metrics_string();
    if metrics.is_empty() {
        writeln!(out, "# no metrics recorded")?;
    } else {
        write!(out, "{}", metrics)?;
    }
    Ok(())
}

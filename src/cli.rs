//! Shared helpers for the command-line binaries

use chrono::{TimeZone, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use crate::blockchain::Block;
use crate::config::{load_config, Config};
use crate::error::Result;
use crate::ledger::Ledger;

/// Install the fmt subscriber, honouring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load `config.toml` and build an initialized ledger from it.
pub fn load_ledger_from_config() -> Result<(Config, Ledger)> {
    let config = load_config()?;
    let ledger = Ledger::from_config(&config)?;
    ledger.ensure_initialized();
    Ok((config, ledger))
}

/// Shorten a 64-char hash to `0123456789...abcdef0123` for display.
///
/// Counts chars, not bytes: hashes read from a tampered file may hold any text.
pub fn format_hash(hash: &str) -> String {
    let len = hash.chars().count();
    if len > 20 {
        let head: String = hash.chars().take(10).collect();
        let tail: String = hash.chars().skip(len - 10).collect();
        format!("{}...{}", head, tail)
    } else {
        hash.to_string()
    }
}

pub fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Table of `blocks` with their verification status.
pub fn chain_table(blocks: &[(Block, bool)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Block").add_attribute(Attribute::Bold),
            Cell::new("Sign").add_attribute(Attribute::Bold),
            Cell::new("Confidence").add_attribute(Attribute::Bold),
            Cell::new("Location").add_attribute(Attribute::Bold),
            Cell::new("Time").add_attribute(Attribute::Bold),
            Cell::new("Hash").add_attribute(Attribute::Bold),
            Cell::new("Nonce").add_attribute(Attribute::Bold),
            Cell::new("Valid").add_attribute(Attribute::Bold),
        ]);

    for (index, (block, valid)) in blocks.iter().enumerate() {
        let detection = &block.data.detection_result;
        let status = if *valid {
            Cell::new("yes").fg(TableColor::Green)
        } else {
            Cell::new("NO").fg(TableColor::Red).add_attribute(Attribute::Bold)
        };
        table.add_row(vec![
            Cell::new(index),
            Cell::new(&block.id),
            Cell::new(&detection.sign_type).fg(TableColor::Cyan),
            Cell::new(format!("{:.0}%", detection.confidence * 100.0)),
            Cell::new(block.data.metadata.location.as_deref().unwrap_or("-")),
            Cell::new(format_timestamp(block.timestamp)),
            Cell::new(format_hash(&block.hash)),
            Cell::new(block.nonce),
            status,
        ]);
    }
    table
}

#![forbid(unsafe_code)]
//! Inspect, verify and append to the ChainSign ledger from the terminal.

use std::path::PathBuf;

use chainsign::blockchain::{BoundingBox, DetectionResult, RecordContext};
use chainsign::cli::{chain_table, format_hash, format_timestamp, init_tracing, load_ledger_from_config};
use clap::{Parser, Subcommand};
use colored::*;

#[derive(Parser)]
#[command(name = "chainsign-ledger", about = "ChainSign tamper-evident ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every record with its verification status
    History {
        /// Include the genesis block
        #[arg(long)]
        all: bool,
    },
    /// Verify the whole chain
    Verify {
        /// Also require every block to satisfy the proof-of-work difficulty
        #[arg(long)]
        strict: bool,
    },
    /// Show and verify a single block
    Show { id: String },
    /// Mine and append a detection record for an image file
    Record {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        sign_type: String,
        #[arg(long)]
        confidence: f64,
        #[arg(long)]
        description: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        device_id: Option<String>,
        /// Bounding box as x,y,width,height
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<BoundingBox>,
    },
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{}: {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(BoundingBox {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let (_config, ledger) = load_ledger_from_config()?;

    match cli.command {
        Command::History { all } => {
            let chain = ledger.get_chain();
            let rows: Vec<_> = chain
                .iter()
                .enumerate()
                .filter(|(_, block)| all || !block.is_genesis())
                .map(|(index, block)| (block.clone(), chainsign::blockchain::verify_block(&chain, index)))
                .collect();

            if rows.is_empty() {
                println!("{}", "No records yet.".yellow());
            } else {
                println!("{}", chain_table(&rows));
            }
            println!(
                "{} {}",
                "Total records:".bright_white(),
                chain.len().saturating_sub(1)
            );
        }
        Command::Verify { strict } => {
            let chain = ledger.get_chain();
            let valid = if strict {
                ledger.verify_chain_strict()
            } else {
                ledger.verify_chain_integrity()
            };
            if valid {
                println!("{} ({} blocks)", "Chain is valid".bright_green().bold(), chain.len());
            } else {
                let at = chainsign::blockchain::first_invalid_index(&chain)
                    .map(|i| format!(" first bad block at index {}", i))
                    .unwrap_or_default();
                println!("{}{}", "Chain verification FAILED".bright_red().bold(), at);
                std::process::exit(1);
            }
        }
        Command::Show { id } => {
            let verification = ledger.verify_block_by_id(&id);
            let Some(block) = verification.block else {
                println!("{} {}", "Unknown block:".red(), id);
                std::process::exit(1);
            };
            let detection = &block.data.detection_result;
            println!("{} {}", "Block:".bright_white(), block.id);
            println!("{} {}", "Hash:".bright_white(), block.hash);
            println!("{} {}", "Previous:".bright_white(), block.previous_hash);
            println!("{} {}", "Time:".bright_white(), format_timestamp(block.timestamp));
            println!("{} {}", "Nonce:".bright_white(), block.nonce);
            println!("{} {}", "Image:".bright_white(), format_hash(&block.data.image_hash));
            println!(
                "{} {} ({:.0}%) - {}",
                "Sign:".bright_white(),
                detection.sign_type.cyan(),
                detection.confidence * 100.0,
                detection.description
            );
            if verification.valid {
                println!("{}", "Valid".bright_green().bold());
            } else {
                println!("{}", "INVALID".bright_red().bold());
            }
        }
        Command::Record {
            image,
            sign_type,
            confidence,
            description,
            location,
            device_id,
            bbox,
        } => {
            let bytes = std::fs::read(&image)
                .map_err(|e| format!("Failed to read {}: {}", image.display(), e))?;
            let detection = DetectionResult {
                sign_type,
                confidence,
                bounding_box: bbox,
                description,
            };
            let context = RecordContext { location, device_id };

            println!("{}", "Mining block...".yellow());
            let block = ledger.add_record(&bytes, detection, context).await?;
            ledger.flush().await?;

            println!("{}", "Block recorded".bright_green().bold());
            println!("{} {}", "Id:".bright_white(), block.id);
            println!("{} {}", "Hash:".bright_white(), block.hash);
            println!("{} {}", "Nonce:".bright_white(), block.nonce);
        }
    }

    Ok(())
}

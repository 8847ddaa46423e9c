//! Prints a recorded census population and disassembles its genome.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Parser;

use gridlife_app::sim::Genome;
use gridlife_census::{CensusKey, Population};
use gridlife_cpu::decompile;

#[derive(Parser, Debug)]
#[command(name = "inspect", version, about = "Disassemble a recorded census population")]
struct Cli {
    /// Path to a census record file.
    file: PathBuf,
}

fn format_time(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(elapsed) => format!("{}s since epoch", elapsed.as_secs()),
        Err(_) => "before epoch".to_string(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let population: Population<Genome> = postcard::from_bytes(&bytes)
        .with_context(|| format!("failed to decode {}", cli.file.display()))?;

    println!("species {:016x}", population.key.hash64());
    println!("count   {}", population.count);
    println!("first   {}", format_time(population.first));
    match population.last {
        Some(last) => println!("last    {}", format_time(last)),
        None => println!("last    still alive when recorded"),
    }
    println!("length  {} bytes", population.key.0.len());
    println!();

    let listing = decompile(&population.key.0).context("genome contains unknown opcodes")?;
    for name in listing {
        println!("{name}");
    }
    Ok(())
}

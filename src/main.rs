// src/main.rs
// ============================================================================
// BN-CONVERT CLI
// ============================================================================
//
// Uso:
//   bn-convert deploy.json legacy.safetensors -o converted.safetensors
//
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use bn_convert::{convert, ConvertOptions, EPS};

#[derive(Parser, Debug)]
#[command(name = "bn-convert")]
#[command(
    about = "Convert a legacy BN model to the new version: the stored running \
             variance is replaced by 1 / sqrt(var + eps)"
)]
#[command(version)]
struct Args {
    /// Network topology descriptor (JSON)
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Legacy weights (safetensors)
    #[arg(value_name = "WEIGHTS")]
    weights: PathBuf,

    /// Output weights file
    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Convert even if the weights are already marked as migrated
    #[arg(long)]
    force: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let start = Instant::now();

    println!("═══════════════════════════════════════════════════════════════");
    println!("  BN CONVERTER v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Model:   {}", args.model.display());
    println!("  Weights: {}", args.weights.display());
    println!("  Output:  {}", args.output.display());
    println!("  Eps:     {:e}", EPS);
    println!("═══════════════════════════════════════════════════════════════");

    let opts = ConvertOptions {
        topology: args.model,
        weights: args.weights,
        output: args.output,
        force: args.force,
    };

    let stats = convert(&opts)
        .with_context(|| format!("Failed to convert {}", opts.weights.display()))?;

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  CONVERSION COMPLETE");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Time:      {:.2}s", start.elapsed().as_secs_f64());
    println!("  Layers:    {} ({} BN)", stats.layers, stats.transform.bn_layers);
    println!("  Tensors:   {}", stats.tensors);
    println!("  Rewritten: {} values", stats.transform.elements);
    println!("  Size:      {:.1} MB", stats.bytes_written as f64 / 1024.0 / 1024.0);
    println!("  Source:    xxh3 {}", stats.source_xxh3);
    println!("  Output:    {}", opts.output.display());
    println!("═══════════════════════════════════════════════════════════════");

    Ok(())
}

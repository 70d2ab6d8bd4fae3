// src/bin/inspect.rs
// ============================================================================
// BN INSPECTOR - Inspecciona un archivo de pesos y sus capas BN
// ============================================================================
//
// Uso: bn-inspect pesos.safetensors [--metadata]
//
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use bn_convert::convert::{is_migrated, META_BN_EPS};
use bn_convert::model::{is_bn_name, BN_VARIANCE_INDEX};
use bn_convert::safetensor::{param_tensor_name, split_param_tensor_name, SafetensorFile};

#[derive(Parser)]
#[command(name = "bn-inspect")]
#[command(about = "Inspect a weights file and its BN variance slots")]
struct Args {
    /// Weights file to inspect
    file: PathBuf,

    /// Show __metadata__ JSON
    #[arg(long)]
    metadata: bool,
}

fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size as f64 / 1024.0 / 1024.0)
    } else {
        format!("{:.2} GB", size as f64 / 1024.0 / 1024.0 / 1024.0)
    }
}

/// (min, max, media) de un slice no vacío
fn summarize(values: &[f32]) -> Option<(f32, f32, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
    Some((min, max, mean))
}

/// Agrupa "capa.i" por capa, en orden de primera aparición
fn group_by_layer<'a>(names: &[&'a str]) -> Vec<(&'a str, Vec<&'a str>)> {
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for &name in names {
        let layer = split_param_tensor_name(name).map_or(name, |(layer, _)| layer);
        let slot = *index.entry(layer).or_insert_with(|| {
            groups.push((layer, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(name);
    }
    groups
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let file_size = std::fs::metadata(&args.file)
        .with_context(|| format!("Cannot stat {}", args.file.display()))?
        .len();
    let file = SafetensorFile::open(&args.file)?;
    let metadata = file.metadata();
    let migrated = is_migrated(&metadata);

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  BN INSPECTOR");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  File:      {}", args.file.display());
    println!("  Size:      {}", format_size(file_size));
    println!("  Tensors:   {}", file.len());
    println!(
        "  BN slot 3: {}",
        if migrated { "1/sqrt(var + eps)" } else { "running variance (legacy)" }
    );
    if let Some(eps) = metadata.get(META_BN_EPS) {
        println!("  Eps:       {}", eps);
    }
    println!("═══════════════════════════════════════════════════════════════");

    // ═══════════════════════════════════════════════════════════════
    // CAPAS
    // ═══════════════════════════════════════════════════════════════
    let names = file.tensor_names();
    let groups = group_by_layer(&names);
    let mut bn_count = 0;

    println!();
    for (layer, tensors) in &groups {
        let shapes: Vec<String> = tensors
            .iter()
            .filter_map(|t| file.tensor_info(t))
            .map(|info| format!("{}{:?}", info.dtype, info.shape))
            .collect();
        println!("  {:32} {}", layer, shapes.join(" "));

        if !is_bn_name(layer) {
            continue;
        }
        bn_count += 1;

        let slot = param_tensor_name(layer, BN_VARIANCE_INDEX);
        match file.read_f32(&slot).as_deref().and_then(summarize) {
            Some((min, max, mean)) => println!(
                "  {:32}   slot {}: min {:.6} max {:.6} mean {:.6}",
                "", BN_VARIANCE_INDEX, min, max, mean
            ),
            None => println!("  {:32}   ✗ no variance slot ({})", "", slot),
        }
    }

    println!();
    println!("  {} layers, {} BN", groups.len(), bn_count);

    // ═══════════════════════════════════════════════════════════════
    // METADATA (opcional)
    // ═══════════════════════════════════════════════════════════════
    if args.metadata {
        let sorted: BTreeMap<_, _> = metadata.iter().collect();
        println!();
        println!("{}", serde_json::to_string_pretty(&sorted)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_layer() {
        let names = ["conv1.0", "conv1.1", "conv1_bn.0", "conv1_bn.3", "orphan"];
        let groups = group_by_layer(&names);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], ("conv1", vec!["conv1.0", "conv1.1"]));
        assert_eq!(groups[1].0, "conv1_bn");
        assert_eq!(groups[2], ("orphan", vec!["orphan"]));
    }

    #[test]
    fn test_group_by_layer_interleaved() {
        let names = ["conv1_bn.0", "conv1.0", "conv1_bn.3", "conv1.1", "conv1_bn.1"];
        let groups = group_by_layer(&names);
        assert_eq!(
            groups,
            vec![
                ("conv1_bn", vec!["conv1_bn.0", "conv1_bn.3", "conv1_bn.1"]),
                ("conv1", vec!["conv1.0", "conv1.1"]),
            ]
        );
        let bn = groups.iter().filter(|(layer, _)| is_bn_name(layer)).count();
        assert_eq!(bn, 1);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&[]), None);
        let (min, max, mean) = summarize(&[1.0, 3.0, 2.0]).unwrap();
        assert_eq!((min, max), (1.0, 3.0));
        assert!((mean - 2.0).abs() < 1e-12);
    }
}

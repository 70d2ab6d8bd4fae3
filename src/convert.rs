// src/convert.rs
// ============================================================================
// CONVERT - Orquestador: load -> guarda de migración -> transform -> save
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{info, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{ConvertError, Result};
use crate::model::Model;
use crate::safetensor::SafetensorFile;
use crate::topology::Topology;
use crate::transform::{bn_var_to_inv_std, TransformStats, EPS};

/// Clave de metadata que marca el espacio de la varianza BN
pub const META_BN_VARIANCE: &str = "bn_variance";
/// Valor tras la migración
pub const BN_VARIANCE_INV_STD: &str = "inv_std";

pub const META_BN_EPS: &str = "bn_eps";
pub const META_GENERATOR: &str = "generator";
pub const META_SOURCE_WEIGHTS: &str = "source_weights";
pub const META_SOURCE_XXH3: &str = "source_xxh3";
pub const META_CONVERTED_AT: &str = "converted_at";

pub const GENERATOR: &str = concat!("bn-convert ", env!("CARGO_PKG_VERSION"));

/// Parámetros de una conversión
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub topology: PathBuf,
    pub weights: PathBuf,
    pub output: PathBuf,
    /// Convertir aunque el archivo ya esté marcado como migrado
    pub force: bool,
}

/// Resultado de una conversión
#[derive(Debug, Default, Clone)]
pub struct ConvertStats {
    pub layers: usize,
    pub tensors: usize,
    pub transform: TransformStats,
    pub bytes_written: u64,
    pub source_xxh3: String,
}

/// ¿La metadata indica que la varianza ya es inv_std?
pub fn is_migrated(metadata: &HashMap<String, String>) -> bool {
    metadata.get(META_BN_VARIANCE).map(String::as_str) == Some(BN_VARIANCE_INV_STD)
}

/// XXH3-64 del archivo completo, en hex
pub fn file_xxh3(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; 1 << 20];

    loop {
        let n = reader.read(&mut buf).map_err(|e| ConvertError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:016x}", hasher.digest()))
}

/// Ejecuta la migración completa
pub fn convert(opts: &ConvertOptions) -> Result<ConvertStats> {
    // ══════════════════════════════════════════════════════════════════════
    // LOAD
    // ══════════════════════════════════════════════════════════════════════

    info!("Loading topology {}", opts.topology.display());
    let topology = Topology::from_file(&opts.topology)?;

    info!("Loading weights {}", opts.weights.display());
    let weights = SafetensorFile::open(&opts.weights)?;
    let source_meta = weights.metadata();

    if is_migrated(&source_meta) {
        if !opts.force {
            return Err(ConvertError::AlreadyMigrated {
                path: opts.weights.clone(),
            });
        }
        warn!(
            "{} is already migrated; converting again because --force was given",
            opts.weights.display()
        );
    }

    let mut model = Model::from_parts(&topology, &weights)?;
    drop(weights);

    info!(
        "Model '{}': {} layers with params, {} tensors",
        topology.name,
        model.len(),
        model.total_tensors()
    );

    // ══════════════════════════════════════════════════════════════════════
    // TRANSFORM
    // ══════════════════════════════════════════════════════════════════════

    let transform = bn_var_to_inv_std(&mut model);
    info!(
        "Converted {} BN layers ({} values)",
        transform.bn_layers, transform.elements
    );

    // ══════════════════════════════════════════════════════════════════════
    // SAVE
    // ══════════════════════════════════════════════════════════════════════

    let source_xxh3 = file_xxh3(&opts.weights)?;

    let mut metadata: BTreeMap<String, String> = source_meta.into_iter().collect();
    metadata.insert(META_BN_VARIANCE.to_string(), BN_VARIANCE_INV_STD.to_string());
    metadata.insert(META_BN_EPS.to_string(), format!("{:e}", EPS));
    metadata.insert(META_GENERATOR.to_string(), GENERATOR.to_string());
    metadata.insert(
        META_SOURCE_WEIGHTS.to_string(),
        opts.weights
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    metadata.insert(META_SOURCE_XXH3.to_string(), source_xxh3.clone());
    metadata.insert(
        META_CONVERTED_AT.to_string(),
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );

    info!("Writing {}", opts.output.display());
    let bytes_written = model.save(&opts.output, &metadata)?;

    Ok(ConvertStats {
        layers: model.len(),
        tensors: model.total_tensors(),
        transform,
        bytes_written,
        source_xxh3,
    })
}

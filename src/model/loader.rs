// src/model/loader.rs
// ============================================================================
// MODEL LOADER - Topología + pesos -> Model
// ============================================================================

use std::collections::HashSet;
use std::path::Path;

use log::{debug, warn};

use super::{is_bn_name, BnParams, Layer, LayerParams, Model, Tensor, BN_PARAM_COUNT};
use crate::error::{ConvertError, Result};
use crate::safetensor::{param_tensor_name, split_param_tensor_name, SafetensorFile};
use crate::topology::Topology;

impl Model {
    /// Carga un modelo completo desde disco
    pub fn load(topology: impl AsRef<Path>, weights: impl AsRef<Path>) -> Result<Self> {
        let topology = Topology::from_file(topology)?;
        let weights = SafetensorFile::open(weights)?;
        Self::from_parts(&topology, &weights)
    }

    /// Construye el modelo cruzando la topología con un archivo de pesos abierto.
    ///
    /// Cada parámetro declarado debe existir con la misma shape. Los tensores
    /// del archivo que no pertenecen a ninguna capa se ignoran.
    pub fn from_parts(topology: &Topology, weights: &SafetensorFile) -> Result<Self> {
        let mut layers = Vec::new();
        let mut consumed = HashSet::new();

        for spec in topology.param_layers() {
            let mut tensors = Vec::with_capacity(spec.params.len());

            for (idx, expected_shape) in spec.params.iter().enumerate() {
                let name = param_tensor_name(&spec.name, idx);
                let mismatch = |message: String| ConvertError::Mismatch {
                    layer: spec.name.clone(),
                    message,
                };

                let info = weights
                    .tensor_info(&name)
                    .ok_or_else(|| mismatch(format!("tensor '{}' not found in weights", name)))?;

                if &info.shape != expected_shape {
                    return Err(mismatch(format!(
                        "param {} shape {:?} in weights, {:?} in topology",
                        idx, info.shape, expected_shape
                    )));
                }

                let (dtype, raw) = weights
                    .dtype(&name)
                    .zip(weights.read_raw(&name))
                    .ok_or_else(|| mismatch(format!("tensor '{}' unreadable", name)))?;

                tensors.push(Tensor::from_raw(info.shape.clone(), dtype, raw.to_vec()));
                consumed.insert(name);
            }

            let params = if is_bn_name(&spec.name) {
                let bn = BnParams::from_positional(tensors).map_err(|found| {
                    ConvertError::MissingBnParam {
                        layer: spec.name.clone(),
                        expected: BN_PARAM_COUNT,
                        found,
                    }
                })?;
                LayerParams::BatchNorm(bn)
            } else {
                LayerParams::Plain(tensors)
            };

            debug!("Loaded layer {} ({}, {} params)", spec.name, spec.kind, spec.params.len());

            layers.push(Layer {
                name: spec.name.clone(),
                kind: spec.kind.clone(),
                params,
            });
        }

        // Pesos sobrantes: un aviso por capa, no error
        for layer in ignored_layers(weights, &consumed) {
            warn!("Ignoring weights for '{}' (not in topology)", layer);
        }

        Ok(Self { layers })
    }
}

/// Capas con tensores no consumidos, sin repetir y en orden de aparición
fn ignored_layers<'a>(weights: &'a SafetensorFile, consumed: &HashSet<String>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    weights
        .tensor_names()
        .into_iter()
        .filter(|name| !consumed.contains(*name))
        .map(|name| split_param_tensor_name(name).map_or(name, |(layer, _)| layer))
        .filter(|layer| seen.insert(*layer))
        .collect()
}

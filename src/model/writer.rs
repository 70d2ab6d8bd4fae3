// src/model/writer.rs
// ============================================================================
// MODEL WRITER - Model -> safetensor ("capa.i" en orden de red)
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use super::Model;
use crate::error::Result;
use crate::safetensor::{param_tensor_name, SafetensorWriter};

impl Model {
    /// Serializa todos los parámetros en `path`, sobrescribiendo el archivo.
    /// Cada tensor conserva su dtype original. Devuelve bytes escritos.
    pub fn save(&self, path: impl AsRef<Path>, metadata: &BTreeMap<String, String>) -> Result<u64> {
        let mut writer = SafetensorWriter::create(path)?;

        for layer in &self.layers {
            for (idx, tensor) in layer.tensors().into_iter().enumerate() {
                writer.write_tensor(
                    &param_tensor_name(&layer.name, idx),
                    tensor.dtype,
                    &tensor.shape,
                    &tensor.raw,
                )?;
            }
        }

        debug!("Writing {} tensors", writer.len());
        writer.finalize(metadata)
    }
}

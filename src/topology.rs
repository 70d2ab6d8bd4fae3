// src/topology.rs
// ============================================================================
// TOPOLOGY - Descriptor JSON de la red (orden, nombres y shapes de params)
// ============================================================================
//
// {
//   "name": "bn_inception",
//   "layers": [
//     { "name": "conv1",    "type": "Convolution", "params": [[64, 3, 7, 7], [64]] },
//     { "name": "conv1_bn", "type": "BN",          "params": [[1, 64, 1, 1], ...] },
//     { "name": "relu1",    "type": "ReLU" }
//   ]
// }
//
// ============================================================================

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Una capa del descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Shape declarada de cada tensor de parámetros, en orden
    #[serde(default)]
    pub params: Vec<Vec<usize>>,
}

impl LayerSpec {
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

/// Descriptor completo de la red
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub name: String,
    pub layers: Vec<LayerSpec>,
}

impl Topology {
    /// Lee y valida un descriptor desde disco
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;

        let topology: Topology =
            serde_json::from_slice(&bytes).map_err(|e| ConvertError::InvalidTopology {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        topology
            .validate()
            .map_err(|message| ConvertError::InvalidTopology {
                path: path.to_path_buf(),
                message,
            })?;

        Ok(topology)
    }

    /// Nombres únicos y no vacíos
    fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.name.is_empty() {
                return Err("layer with empty name".to_string());
            }
            if !seen.insert(layer.name.as_str()) {
                return Err(format!("duplicate layer name '{}'", layer.name));
            }
        }
        Ok(())
    }

    /// Capas que poseen parámetros, en orden de la red
    pub fn param_layers(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter().filter(|l| l.has_params())
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_topology() {
        let file = write_tmp(
            r#"{
                "name": "tiny",
                "layers": [
                    { "name": "conv1", "type": "Convolution", "params": [[4, 3, 3, 3], [4]] },
                    { "name": "conv1_bn", "type": "BN", "params": [[4], [4], [4], [4]] },
                    { "name": "relu1", "type": "ReLU" }
                ]
            }"#,
        );

        let topo = Topology::from_file(file.path()).unwrap();
        assert_eq!(topo.name, "tiny");
        assert_eq!(topo.layers.len(), 3);
        assert_eq!(topo.layers[1].kind, "BN");

        let with_params: Vec<&str> = topo.param_layers().map(|l| l.name.as_str()).collect();
        assert_eq!(with_params, vec!["conv1", "conv1_bn"]);
        assert!(topo.layer("relu1").is_some());
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let file = write_tmp(
            r#"{ "layers": [ { "name": "a", "params": [[1]] }, { "name": "a" } ] }"#,
        );
        let err = Topology::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTopology { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_tmp("{ layers: ");
        assert!(matches!(
            Topology::from_file(file.path()),
            Err(ConvertError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Topology::from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}

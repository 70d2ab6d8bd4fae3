// src/safetensor/mod.rs
// ============================================================================
// SAFETENSOR - Artefacto de pesos (lectura mmap + escritura)
// ============================================================================
//
// Layout:
//   [u64 LE: tamaño header][header JSON][datos LE contiguos]
//
// Los data_offsets del header son relativos al inicio de los datos.
//
// ============================================================================

pub mod writer;

pub use writer::SafetensorWriter;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Clave reservada para metadata en el header
pub const METADATA_KEY: &str = "__metadata__";

/// Tamaño máximo aceptado para el header JSON (100 MB)
const MAX_HEADER_SIZE: u64 = 100 * 1024 * 1024;

/// Tipos de elemento soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F16,
    BF16,
}

impl Dtype {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "F32" => Some(Self::F32),
            "F16" => Some(Self::F16),
            "BF16" => Some(Self::BF16),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::BF16 => "BF16",
        }
    }

    /// Bytes por elemento
    pub fn size(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// Decodifica bytes LE a f32 (exacto para los tres formatos)
    pub fn decode(&self, data: &[u8]) -> Vec<f32> {
        match self {
            Self::F32 => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            Self::F16 => data
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            Self::BF16 => data
                .chunks_exact(2)
                .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
        }
    }

    /// Codifica f32 al formato de almacenamiento
    pub fn encode(&self, data: &[f32]) -> Vec<u8> {
        match self {
            Self::F32 => data.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::F16 => data
                .iter()
                .flat_map(|&x| half::f16::from_f32(x).to_le_bytes())
                .collect(),
            Self::BF16 => data
                .iter()
                .flat_map(|&x| half::bf16::from_f32(x).to_le_bytes())
                .collect(),
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Información de un tensor en el archivo safetensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

impl TensorInfo {
    /// Número de elementos; `None` si la shape desborda usize
    pub fn numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Bytes que ocupa en `dtype`; `None` si desborda
    pub fn byte_len(&self, dtype: Dtype) -> Option<usize> {
        self.numel()?.checked_mul(dtype.size())
    }
}

/// Header del archivo safetensor
#[derive(Debug, Deserialize)]
pub struct SafetensorHeader {
    #[serde(flatten)]
    pub tensors: HashMap<String, TensorInfo>,
    #[serde(rename = "__metadata__")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Archivo safetensor abierto
pub struct SafetensorFile {
    pub path: PathBuf,
    pub header: SafetensorHeader,
    pub header_size: usize,
    mmap: Mmap,
}

impl SafetensorFile {
    /// Abre un archivo safetensor y valida los offsets de todos sus tensores
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ConvertError::io(&path, e))?;
        let invalid = |message: String| ConvertError::InvalidWeights {
            path: path.clone(),
            message,
        };

        // Tamaño del header (primeros 8 bytes, little-endian u64)
        let mut reader = BufReader::new(&file);
        let header_len = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| invalid(format!("cannot read header size: {}", e)))?;
        if header_len > MAX_HEADER_SIZE {
            return Err(invalid(format!("header size {} too large", header_len)));
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|e| invalid(format!("truncated header: {}", e)))?;

        let header: SafetensorHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| invalid(format!("header JSON: {}", e)))?;

        // El archivo no se modifica mientras el mapping está vivo
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ConvertError::io(&path, e))?;

        let header_size = 8 + header_len as usize;
        let data_len = mmap.len().saturating_sub(header_size);

        for (name, info) in &header.tensors {
            let [start, end] = info.data_offsets;
            if start > end || end > data_len {
                return Err(invalid(format!(
                    "tensor '{}' offsets [{}, {}] outside data section ({} bytes)",
                    name, start, end, data_len
                )));
            }
            let dtype = Dtype::from_str(&info.dtype).ok_or_else(|| {
                ConvertError::UnsupportedDtype {
                    tensor: name.clone(),
                    dtype: info.dtype.clone(),
                }
            })?;
            let expected = info.byte_len(dtype).ok_or_else(|| {
                invalid(format!("tensor '{}' shape {:?} overflows", name, info.shape))
            })?;
            if end - start != expected {
                return Err(invalid(format!(
                    "tensor '{}' has {} bytes, shape {:?} needs {}",
                    name,
                    end - start,
                    info.shape,
                    expected
                )));
            }
        }

        Ok(Self {
            path,
            header,
            header_size,
            mmap,
        })
    }

    /// Nombres de tensores en orden de almacenamiento
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut entries: Vec<(&String, &TensorInfo)> = self.header.tensors.iter().collect();
        entries.sort_by_key(|(name, info)| (info.data_offsets[0], name.as_str()));
        entries.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.header.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.tensors.is_empty()
    }

    /// Obtiene información de un tensor
    pub fn tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.header.tensors.get(name)
    }

    /// Metadata del header (vacía si no existe)
    pub fn metadata(&self) -> HashMap<String, String> {
        self.header.metadata.clone().unwrap_or_default()
    }

    /// Lee un tensor como bytes raw
    pub fn read_raw(&self, name: &str) -> Option<&[u8]> {
        let info = self.header.tensors.get(name)?;
        let start = self.header_size + info.data_offsets[0];
        let end = self.header_size + info.data_offsets[1];
        Some(&self.mmap[start..end])
    }

    /// Dtype ya validado en `open`
    pub fn dtype(&self, name: &str) -> Option<Dtype> {
        self.tensor_info(name).and_then(|info| Dtype::from_str(&info.dtype))
    }

    /// Lee un tensor como f32 (convierte desde dtype original)
    pub fn read_f32(&self, name: &str) -> Option<Vec<f32>> {
        let dtype = self.dtype(name)?;
        let data = self.read_raw(name)?;
        Some(dtype.decode(data))
    }
}

/// Nombre del tensor i-ésimo de una capa
pub fn param_tensor_name(layer: &str, index: usize) -> String {
    format!("{}.{}", layer, index)
}

/// Inverso de `param_tensor_name`: ("conv1_bn", 3) desde "conv1_bn.3"
pub fn split_param_tensor_name(name: &str) -> Option<(&str, usize)> {
    let (layer, index) = name.rsplit_once('.')?;
    let index = index.parse().ok()?;
    Some((layer, index))
}

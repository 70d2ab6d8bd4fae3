// src/safetensor/writer.rs
// ============================================================================
// SAFETENSOR WRITER - Serializa tensores en orden a un único archivo
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use super::{Dtype, TensorInfo, METADATA_KEY};
use crate::error::{ConvertError, Result};

/// Tensor pendiente de escritura
struct PendingTensor {
    name: String,
    info: TensorInfo,
    data: Vec<u8>,
}

/// Builder para archivos safetensor
///
/// El header necesita todos los offsets, así que los datos se acumulan y se
/// escriben en `finalize`.
pub struct SafetensorWriter {
    path: PathBuf,
    file: BufWriter<File>,
    tensors: Vec<PendingTensor>,
    current_offset: usize,
}

impl SafetensorWriter {
    /// Crea (o trunca) el archivo de salida
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| ConvertError::io(&path, e))?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
            tensors: Vec::new(),
            current_offset: 0,
        })
    }

    /// Añade un tensor ya codificado en `dtype` (bytes LE)
    pub fn write_tensor(
        &mut self,
        name: &str,
        dtype: Dtype,
        shape: &[usize],
        data: &[u8],
    ) -> Result<()> {
        let invalid = |message: String| ConvertError::InvalidWeights {
            path: self.path.clone(),
            message,
        };

        if self.tensors.iter().any(|t| t.name == name) {
            return Err(invalid(format!("duplicate tensor '{}'", name)));
        }

        let info = TensorInfo {
            dtype: dtype.as_str().to_string(),
            shape: shape.to_vec(),
            data_offsets: [0, 0],
        };
        if info.byte_len(dtype) != Some(data.len()) {
            return Err(invalid(format!(
                "tensor '{}' has {} bytes, shape {:?} needs {:?}",
                name,
                data.len(),
                shape,
                info.byte_len(dtype)
            )));
        }

        let start = self.current_offset;
        self.current_offset += data.len();

        self.tensors.push(PendingTensor {
            name: name.to_string(),
            info: TensorInfo {
                data_offsets: [start, self.current_offset],
                ..info
            },
            data: data.to_vec(),
        });

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Escribe header + datos y hace flush. Devuelve bytes escritos.
    pub fn finalize(mut self, metadata: &BTreeMap<String, String>) -> Result<u64> {
        let mut header = serde_json::Map::new();
        if !metadata.is_empty() {
            header.insert(METADATA_KEY.to_string(), serde_json::to_value(metadata)?);
        }
        for tensor in &self.tensors {
            header.insert(tensor.name.clone(), serde_json::to_value(&tensor.info)?);
        }

        // Padding con espacios hasta múltiplo de 8
        let mut header_bytes = serde_json::to_vec(&serde_json::Value::Object(header))?;
        let padding = (8 - header_bytes.len() % 8) % 8;
        header_bytes.extend(std::iter::repeat(b' ').take(padding));

        let path = self.path.clone();
        let io_err = |e| ConvertError::io(&path, e);

        self.file
            .write_u64::<LittleEndian>(header_bytes.len() as u64)
            .map_err(io_err)?;
        self.file.write_all(&header_bytes).map_err(io_err)?;
        for tensor in &self.tensors {
            self.file.write_all(&tensor.data).map_err(io_err)?;
        }
        self.file.flush().map_err(io_err)?;

        Ok(8 + header_bytes.len() as u64 + self.current_offset as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safetensor::SafetensorFile;

    #[test]
    fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.safetensors");

        let mut writer = SafetensorWriter::create(&path).unwrap();
        writer
            .write_tensor("conv1.0", Dtype::F32, &[2, 2], &Dtype::F32.encode(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        writer
            .write_tensor("conv1.1", Dtype::F16, &[2], &Dtype::F16.encode(&[0.5, -1.0]))
            .unwrap();
        assert_eq!(writer.len(), 2);

        let mut meta = BTreeMap::new();
        meta.insert("generator".to_string(), "test".to_string());
        let written = writer.finalize(&meta).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let file = SafetensorFile::open(&path).unwrap();
        assert_eq!(file.header_size % 8, 0);
        assert_eq!(file.tensor_names(), vec!["conv1.0", "conv1.1"]);
        assert_eq!(file.read_f32("conv1.0").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(file.dtype("conv1.1"), Some(Dtype::F16));
        assert_eq!(file.read_f32("conv1.1").unwrap(), vec![0.5, -1.0]);
        assert_eq!(file.metadata().get("generator").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_duplicate_tensor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SafetensorWriter::create(dir.path().join("dup.safetensors")).unwrap();
        writer.write_tensor("a.0", Dtype::F32, &[1], &1.0f32.to_le_bytes()).unwrap();
        assert!(writer.write_tensor("a.0", Dtype::F32, &[1], &2.0f32.to_le_bytes()).is_err());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SafetensorWriter::create(dir.path().join("bad.safetensors")).unwrap();
        let result = writer.write_tensor("a.0", Dtype::F16, &[3], &[0u8; 4]);
        assert!(matches!(result, Err(ConvertError::InvalidWeights { .. })));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SafetensorWriter::create(dir.path().join("missing").join("x.safetensors"));
        assert!(matches!(result, Err(ConvertError::Io { .. })));
    }
}

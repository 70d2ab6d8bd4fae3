// src/model/mod.rs
// ============================================================================
// MODEL - Mapping ordenado capa -> parámetros, en memoria
// ============================================================================
//
// Las capas BN ("*_bn") se guardan con campos nombrados en vez de posiciones:
//   0 = scale, 1 = bias, 2 = mean, 3 = variance, 4.. = extra
//
// ============================================================================

pub mod loader;
pub mod writer;

use crate::safetensor::Dtype;

/// Sufijo que identifica capas BN
pub const BN_SUFFIX: &str = "_bn";

/// Número mínimo de parámetros de una capa BN
pub const BN_PARAM_COUNT: usize = 4;

/// Posición de la varianza en la lista de parámetros BN
pub const BN_VARIANCE_INDEX: usize = 3;

/// Tensor de parámetros: bytes LE tal cual vienen del archivo
///
/// Los tensores que no se transforman se reescriben sin pasar por f32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub dtype: Dtype,
    pub raw: Vec<u8>,
}

impl Tensor {
    pub fn from_raw(shape: Vec<usize>, dtype: Dtype, raw: Vec<u8>) -> Self {
        debug_assert_eq!(
            shape.iter().try_fold(dtype.size(), |acc, &d| acc.checked_mul(d)),
            Some(raw.len())
        );
        Self { shape, dtype, raw }
    }

    /// Codifica `values` en `dtype`
    pub fn from_f32(shape: Vec<usize>, dtype: Dtype, values: &[f32]) -> Self {
        Self::from_raw(shape, dtype, dtype.encode(values))
    }

    /// Atajo F32 1-D
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self::from_f32(vec![data.len()], Dtype::F32, &data)
    }

    pub fn numel(&self) -> usize {
        self.raw.len() / self.dtype.size()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.dtype.decode(&self.raw)
    }

    /// Aplica `f` elemento a elemento y re-codifica en el mismo dtype
    pub fn map_f32(&mut self, f: impl Fn(f32) -> f32) {
        let values: Vec<f32> = self.to_f32().into_iter().map(f).collect();
        self.raw = self.dtype.encode(&values);
    }
}

/// Parámetros de una capa BN
#[derive(Debug, Clone, PartialEq)]
pub struct BnParams {
    pub scale: Tensor,
    pub bias: Tensor,
    pub mean: Tensor,
    /// Varianza (legacy) o 1/sqrt(var + eps) tras la migración
    pub variance: Tensor,
    /// Parámetros posteriores a la varianza, sin tocar
    pub extra: Vec<Tensor>,
}

impl BnParams {
    /// Construye desde la lista posicional; `Err(n)` si faltan parámetros
    pub fn from_positional(params: Vec<Tensor>) -> std::result::Result<Self, usize> {
        let found = params.len();
        let mut iter = params.into_iter();
        match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(scale), Some(bias), Some(mean), Some(variance)) => Ok(Self {
                scale,
                bias,
                mean,
                variance,
                extra: iter.collect(),
            }),
            _ => Err(found),
        }
    }

    /// Vista posicional (orden de almacenamiento)
    pub fn tensors(&self) -> Vec<&Tensor> {
        let mut out = vec![&self.scale, &self.bias, &self.mean, &self.variance];
        out.extend(self.extra.iter());
        out
    }
}

/// Parámetros de una capa
#[derive(Debug, Clone, PartialEq)]
pub enum LayerParams {
    BatchNorm(BnParams),
    Plain(Vec<Tensor>),
}

/// Capa con parámetros
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Tipo declarado en la topología ("Convolution", "BN", ...)
    pub kind: String,
    pub params: LayerParams,
}

impl Layer {
    pub fn tensors(&self) -> Vec<&Tensor> {
        match &self.params {
            LayerParams::BatchNorm(bn) => bn.tensors(),
            LayerParams::Plain(tensors) => tensors.iter().collect(),
        }
    }
}

/// ¿El nombre sigue la convención BN?
pub fn is_bn_name(name: &str) -> bool {
    name.ends_with(BN_SUFFIX)
}

/// Modelo completo en orden de red
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub layers: Vec<Layer>,
}

impl Model {
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn total_tensors(&self) -> usize {
        self.layers.iter().map(|l| l.tensors().len()).sum()
    }
}

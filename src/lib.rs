// src/lib.rs
// ============================================================================
// BN-CONVERT - Migrador de checkpoints BN legacy (var -> 1/sqrt(var + eps))
// ============================================================================

pub mod convert;
pub mod error;
pub mod model;
pub mod safetensor;
pub mod topology;
pub mod transform;

// Re-exports principales
pub use convert::{convert, ConvertOptions, ConvertStats};
pub use error::{ConvertError, Result};
pub use model::{BnParams, Layer, LayerParams, Model, Tensor};
pub use safetensor::{Dtype, SafetensorFile, SafetensorWriter};
pub use topology::{LayerSpec, Topology};
pub use transform::{bn_var_to_inv_std, inv_std, TransformStats, EPS};

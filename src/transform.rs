// src/transform.rs
// ============================================================================
// TRANSFORM - Varianza BN -> 1/sqrt(var + eps)
// ============================================================================
//
// Migración de un solo uso: aplicarla a un modelo ya migrado produce basura
// (la guarda está en convert.rs, aquí no hay estado).
//
// ============================================================================

use log::debug;

use crate::model::{LayerParams, Model};

/// Epsilon fijo de las capas BN legacy
pub const EPS: f64 = 1e-5;

/// Estadísticas de la transformación
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
    pub layers_scanned: usize,
    pub bn_layers: usize,
    pub elements: usize,
}

/// 1/sqrt(x + eps), calculado en f64
#[inline]
pub fn inv_std(var: f32) -> f32 {
    (1.0 / (var as f64 + EPS).sqrt()) as f32
}

/// Reescribe in-place la varianza de cada capa "*_bn"
pub fn bn_var_to_inv_std(model: &mut Model) -> TransformStats {
    let mut stats = TransformStats::default();

    for layer in &mut model.layers {
        stats.layers_scanned += 1;

        if let LayerParams::BatchNorm(bn) = &mut layer.params {
            bn.variance.map_f32(inv_std);
            stats.bn_layers += 1;
            stats.elements += bn.variance.numel();
            debug!("  {} : {} values -> inv_std", layer.name, bn.variance.numel());
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BnParams, Layer, Tensor};
    use crate::safetensor::Dtype;
    use rand::Rng;

    fn bn_layer(name: &str, variance: Vec<f32>) -> Layer {
        let n = variance.len();
        Layer {
            name: name.to_string(),
            kind: "BN".to_string(),
            params: LayerParams::BatchNorm(BnParams {
                scale: Tensor::from_vec(vec![1.5; n]),
                bias: Tensor::from_vec(vec![-0.5; n]),
                mean: Tensor::from_vec(vec![0.25; n]),
                variance: Tensor::from_vec(variance),
                extra: vec![Tensor::from_vec(vec![7.0])],
            }),
        }
    }

    fn plain_layer(name: &str, data: Vec<f32>) -> Layer {
        Layer {
            name: name.to_string(),
            kind: "Convolution".to_string(),
            params: LayerParams::Plain(vec![Tensor::from_vec(data)]),
        }
    }

    #[test]
    fn test_inv_std_values() {
        let out = [inv_std(0.0), inv_std(3.0)];
        assert!((out[0] - 316.227_77).abs() < 1e-3);
        assert!((out[1] - 0.577_349_3).abs() < 1e-6);
        assert!((inv_std(1.0) - 0.999_995).abs() < 1e-6);
    }

    #[test]
    fn test_transform_scenario() {
        let mut model = Model {
            layers: vec![bn_layer("conv1_bn", vec![0.0, 3.0])],
        };

        let stats = bn_var_to_inv_std(&mut model);
        assert_eq!(stats, TransformStats { layers_scanned: 1, bn_layers: 1, elements: 2 });

        match &model.layers[0].params {
            LayerParams::BatchNorm(bn) => {
                let expected = [1.0 / (1e-5f64).sqrt(), 1.0 / (3.00001f64).sqrt()];
                for (got, want) in bn.variance.to_f32().iter().zip(expected) {
                    assert!((*got as f64 - want).abs() / want < 1e-6);
                }
                // El resto de la capa no cambia
                assert_eq!(bn.scale.to_f32(), vec![1.5, 1.5]);
                assert_eq!(bn.bias.to_f32(), vec![-0.5, -0.5]);
                assert_eq!(bn.mean.to_f32(), vec![0.25, 0.25]);
                assert_eq!(bn.extra[0].to_f32(), vec![7.0]);
            }
            _ => panic!("expected BatchNorm"),
        }
    }

    #[test]
    fn test_non_bn_layers_bit_identical() {
        let mut rng = rand::thread_rng();
        let data: Vec<f32> = (0..256).map(|_| rng.gen_range(-10.0..10.0)).collect();

        let mut model = Model {
            layers: vec![
                plain_layer("conv1", data.clone()),
                bn_layer("conv1_bn", vec![1.0; 4]),
                plain_layer("bn_conv2", vec![-0.0, f32::NAN, 4.0]),
            ],
        };
        let before = model.clone();

        bn_var_to_inv_std(&mut model);

        for idx in [0, 2] {
            let a = before.layers[idx].tensors();
            let b = model.layers[idx].tensors();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_random_variances_match_formula() {
        let mut rng = rand::thread_rng();
        let var: Vec<f32> = (0..1000).map(|_| rng.gen_range(0.0..100.0)).collect();
        let mut model = Model { layers: vec![bn_layer("res2a_bn", var.clone())] };

        bn_var_to_inv_std(&mut model);

        if let LayerParams::BatchNorm(bn) = &model.layers[0].params {
            for (v, out) in var.iter().zip(&bn.variance.to_f32()) {
                let want = 1.0 / (*v as f64 + 1e-5).sqrt();
                assert!((*out as f64 - want).abs() <= want * 1e-6);
            }
        } else {
            panic!("expected BatchNorm");
        }
    }

    #[test]
    fn test_no_bn_layers_is_noop() {
        let mut model = Model {
            layers: vec![plain_layer("conv1", vec![1.0, 2.0]), plain_layer("fc", vec![3.0])],
        };
        let before = model.clone();

        let stats = bn_var_to_inv_std(&mut model);
        assert_eq!(stats.bn_layers, 0);
        assert_eq!(stats.elements, 0);
        assert_eq!(model, before);
    }

    #[test]
    fn test_keeps_dtype() {
        let mut layer = bn_layer("conv1_bn", vec![3.0]);
        if let LayerParams::BatchNorm(bn) = &mut layer.params {
            bn.variance.dtype = Dtype::F16;
        }
        let mut model = Model { layers: vec![layer] };

        bn_var_to_inv_std(&mut model);

        if let LayerParams::BatchNorm(bn) = &model.layers[0].params {
            assert_eq!(bn.variance.dtype, Dtype::F16);
        }
    }
}

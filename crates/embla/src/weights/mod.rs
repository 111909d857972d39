//! Checkpoint access: raw safetensors plus typed tensor extraction.
//!
//! [`ModelWeights`] is the layer the model builder talks to. It converts
//! on-disk dtypes to `f32` and expands quantized projections transparently,
//! so construction code only ever sees plain matrices.

use std::path::Path;

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

use crate::embeddings::Embedding;
use crate::linear::Linear;
use crate::quantize::{dequantize, QuantizationConfig};

mod safetensors_loader;

pub use safetensors_loader::SafeTensorsLoader;

pub struct ModelWeights {
    loader: SafeTensorsLoader,
    quantization: Option<QuantizationConfig>,
}

impl ModelWeights {
    pub fn load(path: &Path, quantization: Option<QuantizationConfig>) -> Result<Self> {
        Ok(Self {
            loader: SafeTensorsLoader::new(path)?,
            quantization,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loader.contains(name)
    }

    pub fn tensor_count(&self) -> usize {
        self.loader.tensor_count()
    }

    pub fn get_array1(&self, name: &str) -> Result<Array1<f32>> {
        let view = self.loader.tensor(name)?;
        ensure_rank(name, &view, 1)?;
        Ok(Array1::from_vec(to_f32_vec(name, &view)?))
    }

    pub fn get_array2(&self, name: &str) -> Result<Array2<f32>> {
        let view = self.loader.tensor(name)?;
        ensure_rank(name, &view, 2)?;
        let (rows, cols) = (view.shape()[0], view.shape()[1]);
        Ok(Array2::from_shape_vec(
            (rows, cols),
            to_f32_vec(name, &view)?,
        )?)
    }

    pub fn get_array2_u32(&self, name: &str) -> Result<Array2<u32>> {
        let view = self.loader.tensor(name)?;
        ensure_rank(name, &view, 2)?;
        let (rows, cols) = (view.shape()[0], view.shape()[1]);
        Ok(Array2::from_shape_vec(
            (rows, cols),
            to_u32_vec(name, &view)?,
        )?)
    }

    /// Loads a projection as `[out_features, in_features]`, dequantizing
    /// when the checkpoint stores `{prefix}.scales`.
    pub fn get_linear(&self, prefix: &str) -> Result<Linear> {
        Ok(Linear::new(self.get_weight_matrix(prefix)?))
    }

    pub fn get_embedding(&self, prefix: &str) -> Result<Embedding> {
        Ok(Embedding::new(self.get_weight_matrix(prefix)?))
    }

    fn get_weight_matrix(&self, prefix: &str) -> Result<Array2<f32>> {
        let scales_name = format!("{prefix}.scales");
        if !self.contains(&scales_name) {
            return self.get_array2(&format!("{prefix}.weight"));
        }

        let quant = self.quantization.ok_or_else(|| {
            anyhow!(
                "'{}' is stored quantized but the config has no quantization section",
                prefix
            )
        })?;
        let packed = self.get_array2_u32(&format!("{prefix}.weight"))?;
        let scales = self.get_array2(&scales_name)?;
        let biases = self.get_array2(&format!("{prefix}.biases"))?;
        dequantize(&packed, &scales, &biases, quant.group_size, quant.bits)
    }
}

fn ensure_rank(name: &str, view: &TensorView<'_>, rank: usize) -> Result<()> {
    anyhow::ensure!(
        view.shape().len() == rank,
        "tensor '{}' has shape {:?}, expected rank {}",
        name,
        view.shape(),
        rank
    );
    Ok(())
}

fn to_f32_vec(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>> {
    let bytes = view.data();
    let values = match view.dtype() {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        other => {
            return Err(anyhow!(
                "tensor '{}' has unsupported dtype {:?} for float conversion",
                name,
                other
            ))
        }
    };
    Ok(values)
}

fn to_u32_vec(name: &str, view: &TensorView<'_>) -> Result<Vec<u32>> {
    anyhow::ensure!(
        view.dtype() == Dtype::U32,
        "tensor '{}' has dtype {:?}, expected U32",
        name,
        view.dtype()
    );
    Ok(view
        .data()
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn create_safetensors_file(
        dir: &Path,
        filename: &str,
        tensors: &[(&str, Vec<f32>, Vec<usize>)],
    ) -> Result<()> {
        let stored: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, values, shape)| {
                let bytes: Vec<u8> = values.iter().flat_map(|f| f.to_le_bytes()).collect();
                (name.to_string(), shape.clone(), bytes)
            })
            .collect();

        let mut tensor_map = HashMap::new();
        for (name, shape, bytes) in &stored {
            tensor_map.insert(
                name.clone(),
                TensorView::new(Dtype::F32, shape.clone(), bytes)?,
            );
        }

        safetensors::serialize_to_file(&tensor_map, &None, &dir.join(filename))?;
        Ok(())
    }

    fn write_raw(
        dir: &Path,
        filename: &str,
        tensors: &[(&str, Dtype, Vec<usize>, Vec<u8>)],
    ) -> Result<()> {
        let mut tensor_map = HashMap::new();
        for (name, dtype, shape, bytes) in tensors {
            tensor_map.insert(
                name.to_string(),
                TensorView::new(*dtype, shape.clone(), bytes)?,
            );
        }
        safetensors::serialize_to_file(&tensor_map, &None, &dir.join(filename))?;
        Ok(())
    }

    #[test]
    fn test_get_array2_f32() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(
            dir.path(),
            "model.safetensors",
            &[("w", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3])],
        )
        .unwrap();

        let weights = ModelWeights::load(dir.path(), None).unwrap();
        let w = weights.get_array2("w").unwrap();
        assert_eq!(w.dim(), (2, 3));
        assert_eq!(w[[1, 2]], 6.0);

        // Rank mismatch is an error, not a reshape.
        assert!(weights.get_array1("w").is_err());
    }

    #[test]
    fn test_f16_tensors_convert_to_f32() {
        let dir = tempfile::tempdir().unwrap();
        let values = [0.5f32, -2.0, 1.25];
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect();
        write_raw(
            dir.path(),
            "model.safetensors",
            &[("w", Dtype::F16, vec![3], bytes)],
        )
        .unwrap();

        let weights = ModelWeights::load(dir.path(), None).unwrap();
        let w = weights.get_array1("w").unwrap();
        for (got, want) in w.iter().zip(values.iter()) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn test_get_linear_plain_weight() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(
            dir.path(),
            "model.safetensors",
            &[("proj.weight", vec![1.0, 0.0, 0.0, 1.0], vec![2, 2])],
        )
        .unwrap();

        let weights = ModelWeights::load(dir.path(), None).unwrap();
        let linear = weights.get_linear("proj").unwrap();
        let x = ndarray::array![[3.0f32, 4.0]];
        let y = linear.forward_2d(&x.view());
        assert_eq!(y, ndarray::array![[3.0, 4.0]]);
    }

    #[test]
    fn test_get_linear_dequantizes_when_scales_present() {
        let dir = tempfile::tempdir().unwrap();
        // One row of four 8-bit values: 1, 2, 3, 4.
        let packed_bytes = 0x0403_0201u32.to_le_bytes().to_vec();
        let scales_bytes = 1.0f32.to_le_bytes().to_vec();
        let biases_bytes = 0.0f32.to_le_bytes().to_vec();
        write_raw(
            dir.path(),
            "model.safetensors",
            &[
                ("proj.weight", Dtype::U32, vec![1, 1], packed_bytes),
                ("proj.scales", Dtype::F32, vec![1, 1], scales_bytes),
                ("proj.biases", Dtype::F32, vec![1, 1], biases_bytes),
            ],
        )
        .unwrap();

        let quant = QuantizationConfig {
            group_size: 4,
            bits: 8,
        };
        let weights = ModelWeights::load(dir.path(), Some(quant)).unwrap();
        let linear = weights.get_linear("proj").unwrap();
        let x = ndarray::array![[1.0f32, 1.0, 1.0, 1.0]];
        let y = linear.forward_2d(&x.view());
        assert_eq!(y[[0, 0]], 10.0);

        // Same checkpoint without a quantization config must fail loudly.
        let weights = ModelWeights::load(dir.path(), None).unwrap();
        assert!(weights.get_linear("proj").is_err());
    }
}

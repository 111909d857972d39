//! Token embedding lookup.

use anyhow::Result;
use ndarray::{s, Array2, Array3};

/// Word embedding table, `[vocab_size, hidden_size]`.
#[derive(Debug)]
pub struct Embedding {
    pub weight: Array2<f32>,
}

impl Embedding {
    pub fn new(weight: Array2<f32>) -> Self {
        Self { weight }
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn hidden_size(&self) -> usize {
        self.weight.ncols()
    }

    /// Gathers rows for a single sequence: `[1, len(tokens), hidden]`.
    pub fn forward(&self, tokens: &[u32]) -> Result<Array3<f32>> {
        let hidden = self.hidden_size();
        let mut out = Array3::zeros((1, tokens.len(), hidden));
        for (i, &token) in tokens.iter().enumerate() {
            let row = token as usize;
            if row >= self.vocab_size() {
                anyhow::bail!(
                    "token id {} out of range for vocabulary of {}",
                    token,
                    self.vocab_size()
                );
            }
            out.slice_mut(s![0, i, ..]).assign(&self.weight.row(row));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lookup_gathers_rows() {
        let table = Embedding::new(array![[0.0, 0.1], [1.0, 1.1], [2.0, 2.1]]);
        let out = table.forward(&[2, 0, 2]).unwrap();

        assert_eq!(out.dim(), (1, 3, 2));
        assert_eq!(out[[0, 0, 0]], 2.0);
        assert_eq!(out[[0, 1, 1]], 0.1);
        assert_eq!(out[[0, 2, 0]], 2.0);
    }

    #[test]
    fn test_out_of_range_token_rejected() {
        let table = Embedding::new(array![[0.0], [1.0]]);
        assert!(table.forward(&[2]).is_err());
    }
}

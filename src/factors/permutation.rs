//! 고정 순열 팩터

use super::{check_input, Factor};
use crate::error::{ButterflyError, Result};
use crate::utils::numeric::{bit_reversal_permutation, is_pow2};
use ndarray::{Array2, Array3, ArrayD, Axis};

/// 순열 행렬 P: y[i] = x[perm[i]]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    indices: Vec<usize>,
    complex: bool,
}

impl Permutation {
    pub fn new(indices: Vec<usize>, complex: bool) -> Result<Self> {
        let mut seen = vec![false; indices.len()];
        for &i in &indices {
            if i >= seen.len() || seen[i] {
                return Err(ButterflyError::InvalidPermutation(indices.clone()));
            }
            seen[i] = true;
        }
        Ok(Permutation { indices, complex })
    }

    /// 비트 반전 순열 (n은 2의 거듭제곱)
    pub fn bit_reversal(n: usize, complex: bool) -> Result<Self> {
        if !is_pow2(n) {
            return Err(ButterflyError::NotPowerOfTwo(n));
        }
        Ok(Permutation {
            indices: bit_reversal_permutation(n),
            complex,
        })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl Factor for Permutation {
    fn size(&self) -> usize {
        self.indices.len()
    }

    fn is_complex(&self) -> bool {
        self.complex
    }

    fn matrix(&self, _temperature: f32) -> Result<ArrayD<f32>> {
        let n = self.indices.len();
        if !self.complex {
            let mut m = Array2::<f32>::zeros((n, n));
            for (i, &j) in self.indices.iter().enumerate() {
                m[[i, j]] = 1.0;
            }
            return Ok(m.into_dyn());
        }
        let mut m = Array3::<f32>::zeros((n, n, 2));
        for (i, &j) in self.indices.iter().enumerate() {
            m[[i, j, 0]] = 1.0;
        }
        Ok(m.into_dyn())
    }

    fn forward(&self, input: &ArrayD<f32>, _temperature: f32) -> Result<ArrayD<f32>> {
        let n_axis = check_input(input.view(), self.size(), self.complex)?;
        Ok(input.select(Axis(n_axis), &self.indices))
    }
}

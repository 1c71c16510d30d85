//! 대각 행렬 팩터

use super::{check_input, check_shape, with_pair, Factor};
use crate::error::Result;
use crate::ops::complex::mul_op;
use ndarray::{Array2, Array3, ArrayD, ArrayViewD, Ix1};

/// 대각 행렬 (실수 또는 복소)
#[derive(Debug, Clone, PartialEq)]
pub struct Diagonal {
    size: usize,
    complex: bool,
    diag: ArrayD<f32>,
}

impl Diagonal {
    /// diag: (n,) 또는 (n, 2)
    pub fn new(diag: ArrayD<f32>, complex: bool) -> Result<Self> {
        let size = diag.shape().first().copied().unwrap_or(0);
        check_shape("diag", &with_pair(size, complex), diag.shape())?;
        Ok(Diagonal { size, complex, diag })
    }

    pub fn diag(&self) -> &ArrayD<f32> {
        &self.diag
    }

    pub fn set_diag(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        check_shape("diag", self.diag.shape(), value.shape())?;
        self.diag.assign(&value);
        Ok(())
    }
}

impl Factor for Diagonal {
    fn size(&self) -> usize {
        self.size
    }

    fn is_complex(&self) -> bool {
        self.complex
    }

    fn matrix(&self, _temperature: f32) -> Result<ArrayD<f32>> {
        let n = self.size;
        if !self.complex {
            return Ok(Array2::from_diag(&self.diag.view().into_dimensionality::<Ix1>()?).into_dyn());
        }
        let mut m = Array3::<f32>::zeros((n, n, 2));
        for i in 0..n {
            m[[i, i, 0]] = self.diag[[i, 0]];
            m[[i, i, 1]] = self.diag[[i, 1]];
        }
        Ok(m.into_dyn())
    }

    fn forward(&self, input: &ArrayD<f32>, _temperature: f32) -> Result<ArrayD<f32>> {
        check_input(input.view(), self.size, self.complex)?;
        mul_op(self.diag.view(), input.view(), self.complex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ButterflyError;
    use ndarray::{array, Axis};

    #[test]
    fn complex_diagonal_multiplies_each_entry() {
        let d = Diagonal::new(array![[1.0f32, 1.0], [0.0, 2.0]].into_dyn(), true).unwrap();
        let x = array![[[1.0f32, 0.0], [1.0, 1.0]]].into_dyn();
        let y = d.forward(&x, 1.0).unwrap();
        // (1+i)*1 = 1+i, 2i*(1+i) = -2+2i
        assert_eq!(y, array![[[1.0f32, 1.0], [-2.0, 2.0]]].into_dyn());
        let m = d.matrix(1.0).unwrap();
        assert_eq!(m.index_axis(Axis(2), 1), array![[1.0f32, 0.0], [0.0, 2.0]].into_dyn());
    }

    #[test]
    fn real_diagonal_matrix() {
        let d = Diagonal::new(array![2.0f32, 3.0].into_dyn(), false).unwrap();
        assert_eq!(d.matrix(1.0).unwrap(), array![[2.0f32, 0.0], [0.0, 3.0]].into_dyn());
    }

    #[test]
    fn rejects_real_values_for_complex_diagonal() {
        let err = Diagonal::new(array![1.0f32, 2.0, 3.0].into_dyn(), true).unwrap_err();
        assert!(matches!(err, ButterflyError::ShapeMismatch { name: "diag", .. }));
    }
}

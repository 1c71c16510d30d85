//! 구조적 행렬 팩터 모듈
//!
//! 모든 팩터는 밀집 행렬 표현(`matrix`)과 벡터 배치에 대한 직접 적용(`forward`)
//! 두 연산을 제공하며, `forward(x)`는 `x @ matrix()^T`와 같아야 한다.

mod butterfly;
mod diagonal;
mod permutation;

pub use butterfly::{Butterfly, ButterflyGrad};
pub use diagonal::Diagonal;
pub use permutation::Permutation;

use crate::error::{ButterflyError, Result};
use crate::layers::{ButterflyProduct, MatrixProduct};
use crate::ops::complex::check_complex;
use ndarray::{ArrayD, ArrayViewD};

/// n x n 구조적 연산자의 핵심 트레이트
pub trait Factor {
    /// 행렬 크기 n
    fn size(&self) -> usize;

    /// 복소 행렬 여부
    fn is_complex(&self) -> bool;

    /// 밀집 행렬: (n, n) 또는 (n, n, 2)
    fn matrix(&self, temperature: f32) -> Result<ArrayD<f32>>;

    /// 입력 (..., n) 또는 (..., n, 2)에 직접 적용
    fn forward(&self, input: &ArrayD<f32>, temperature: f32) -> Result<ArrayD<f32>>;
}

/// 조합기에서 쓰이는 팩터들의 태그 유니온
#[derive(Debug, Clone)]
pub enum AnyFactor {
    Butterfly(Butterfly),
    Diagonal(Diagonal),
    Permutation(Permutation),
    Product(MatrixProduct),
    ButterflyProduct(ButterflyProduct),
}

impl AnyFactor {
    fn inner(&self) -> &dyn Factor {
        match self {
            AnyFactor::Butterfly(f) => f,
            AnyFactor::Diagonal(f) => f,
            AnyFactor::Permutation(f) => f,
            AnyFactor::Product(f) => f,
            AnyFactor::ButterflyProduct(f) => f,
        }
    }

    pub fn as_butterfly(&self) -> Option<&Butterfly> {
        match self {
            AnyFactor::Butterfly(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_butterfly_mut(&mut self) -> Option<&mut Butterfly> {
        match self {
            AnyFactor::Butterfly(b) => Some(b),
            _ => None,
        }
    }
}

impl Factor for AnyFactor {
    fn size(&self) -> usize {
        self.inner().size()
    }

    fn is_complex(&self) -> bool {
        self.inner().is_complex()
    }

    fn matrix(&self, temperature: f32) -> Result<ArrayD<f32>> {
        self.inner().matrix(temperature)
    }

    fn forward(&self, input: &ArrayD<f32>, temperature: f32) -> Result<ArrayD<f32>> {
        self.inner().forward(input, temperature)
    }
}

impl From<Butterfly> for AnyFactor {
    fn from(f: Butterfly) -> Self {
        AnyFactor::Butterfly(f)
    }
}

impl From<Diagonal> for AnyFactor {
    fn from(f: Diagonal) -> Self {
        AnyFactor::Diagonal(f)
    }
}

impl From<Permutation> for AnyFactor {
    fn from(f: Permutation) -> Self {
        AnyFactor::Permutation(f)
    }
}

impl From<MatrixProduct> for AnyFactor {
    fn from(f: MatrixProduct) -> Self {
        AnyFactor::Product(f)
    }
}

impl From<ButterflyProduct> for AnyFactor {
    fn from(f: ButterflyProduct) -> Self {
        AnyFactor::ButterflyProduct(f)
    }
}

pub(crate) fn check_shape(name: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(ButterflyError::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// 파라미터 벡터 shape: (len,) 또는 (len, 2)
pub(crate) fn with_pair(len: usize, complex: bool) -> Vec<usize> {
    if complex {
        vec![len, 2]
    } else {
        vec![len]
    }
}

/// 입력 shape을 확인하고 크기 n인 축의 위치를 돌려준다
pub(crate) fn check_input(input: ArrayViewD<f32>, size: usize, complex: bool) -> Result<usize> {
    let inner = if complex { 2 } else { 1 };
    if complex {
        check_complex(input.shape())?;
    }
    let ndim = input.ndim();
    if ndim < inner || input.shape()[ndim - inner] != size {
        return Err(ButterflyError::ShapeMismatch {
            name: "input",
            expected: with_pair(size, complex),
            actual: input.shape().to_vec(),
        });
    }
    Ok(ndim - inner)
}

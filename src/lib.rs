//! ButterflyStone: 학습 가능한 버터플라이 행렬 팩터화 Rust 라이브러리
//!
//! 이 라이브러리는 희소 버터플라이 팩터의 곱으로 n x n 선형 변환을 표현하고,
//! 푸리에 변환과 원형 행렬 곱 같은 빠른 변환을 정확히 재현하는 생성기를 제공합니다.

pub mod config;
pub mod error;
pub mod factors;
pub mod layers;
pub mod ops;
pub mod special;
pub mod utils;

#[cfg(feature = "python")]
pub mod python;

pub use config::{Constants, ProductConfig, SoftmaxFn};
pub use error::{ButterflyError, Result};
pub use factors::{AnyFactor, Butterfly, ButterflyGrad, Diagonal, Factor, Permutation};
pub use layers::{ButterflyLinear, ButterflyProduct, FactorOrder, MatrixProduct, Reordering};
pub use ops::{complex_mul, sinkhorn};
pub use special::{circulant, fft, ifft, Circulant};

/// 자주 사용되는 핵심 기능들을 쉽게 가져올 수 있는 prelude 모듈
pub mod prelude {
    pub use crate::{
        circulant, complex_mul, fft, ifft, sinkhorn, AnyFactor, Butterfly, ButterflyError, ButterflyLinear,
        ButterflyProduct, Circulant, Constants, Factor, MatrixProduct, Permutation, ProductConfig, SoftmaxFn,
    };
}

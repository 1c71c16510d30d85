//! 크레이트 전역 오류 타입

use ndarray::ShapeError;
use thiserror::Error;

/// 버터플라이 팩터화 연산에서 발생하는 오류
///
/// 모든 오류는 생성 시점 또는 호출 시점의 전제조건 위반이며,
/// 내부에서 복구하지 않고 호출자에게 그대로 전파된다.
#[derive(Debug, Error)]
pub enum ButterflyError {
    #[error("size({size})는 diagonal({diagonal})보다 커야 하고 diagonal은 0보다 커야 합니다")]
    InvalidDiagonal { size: usize, diagonal: usize },

    #[error("size({0})는 2 이상이어야 합니다")]
    InvalidSize(usize),

    #[error("size({0})는 2의 거듭제곱이어야 합니다")]
    NotPowerOfTwo(usize),

    #[error("{name}의 shape은 {expected:?}이어야 하지만 {actual:?}입니다")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("알 수 없는 softmax_fn `{0}` (softmax 또는 sparsemax)")]
    UnknownSoftmax(String),

    #[error("정사각 행렬이 필요하지만 shape이 {0:?}입니다")]
    NotSquare(Vec<usize>),

    #[error("복소 텐서는 마지막 축의 크기가 2여야 하지만 shape이 {0:?}입니다")]
    NotComplex(Vec<usize>),

    #[error("shape {0:?}와 {1:?}는 호환되지 않습니다")]
    IncompatibleShapes(Vec<usize>, Vec<usize>),

    #[error("팩터 목록이 비어 있습니다")]
    EmptyFactors,

    #[error("{index}번째 팩터가 맞지 않습니다: {reason}")]
    FactorMismatch { index: usize, reason: String },

    #[error("유효한 순열이 아닙니다: {0:?}")]
    InvalidPermutation(Vec<usize>),

    #[error("n_terms는 0보다 커야 합니다")]
    InvalidTerms,

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// 크레이트 전역 결과 타입
pub type Result<T> = std::result::Result<T, ButterflyError>;

//! 텐서 연산자 구현 모듈

pub mod complex;
mod sinkhorn;
mod softmax;

pub use complex::{apply_dense, complex_conj, complex_matmul, complex_mul, matmul_op, mul_op, real_matmul};
pub use sinkhorn::sinkhorn;
pub use softmax::{selection_probs, softmax, sparsemax};

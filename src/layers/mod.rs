//! 팩터 조합과 레이어 모듈

mod butterfly_product;
mod linear;
mod product;

pub use butterfly_product::{ButterflyProduct, Reordering};
pub use linear::ButterflyLinear;
pub use product::{FactorOrder, MatrixProduct};

//! 설정 모듈

pub mod constants;

use std::fmt;
use std::str::FromStr;

use crate::error::{ButterflyError, Result};

pub use constants::Constants;

/// 학습 순서 모드에서 팩터 선택 확률을 만드는 함수
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftmaxFn {
    #[default]
    Softmax,
    Sparsemax,
}

impl FromStr for SoftmaxFn {
    type Err = ButterflyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "softmax" => Ok(SoftmaxFn::Softmax),
            "sparsemax" => Ok(SoftmaxFn::Sparsemax),
            other => Err(ButterflyError::UnknownSoftmax(other.to_string())),
        }
    }
}

impl fmt::Display for SoftmaxFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftmaxFn::Softmax => write!(f, "softmax"),
            SoftmaxFn::Sparsemax => write!(f, "sparsemax"),
        }
    }
}

/// 행렬 곱 조합기와 버터플라이 곱의 생성 설정
#[derive(Debug, Clone, PartialEq)]
pub struct ProductConfig {
    /// 출력 항 개수 (None이면 팩터 개수)
    pub n_terms: Option<usize>,
    /// 복소 행렬 여부
    pub complex: bool,
    /// 고정 순서 모드 여부
    pub fixed_order: bool,
    /// 학습 순서 모드의 선택 함수
    pub softmax_fn: SoftmaxFn,
    /// Sinkhorn 순열 학습 여부 (버터플라이 곱 전용)
    pub learn_perm: bool,
}

impl Default for ProductConfig {
    fn default() -> Self {
        ProductConfig {
            n_terms: None,
            complex: false,
            fixed_order: false,
            softmax_fn: SoftmaxFn::Softmax,
            learn_perm: false,
        }
    }
}

impl ProductConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_terms(mut self, n_terms: usize) -> Self {
        self.n_terms = Some(n_terms);
        self
    }

    pub fn complex(mut self, complex: bool) -> Self {
        self.complex = complex;
        self
    }

    pub fn fixed_order(mut self, fixed_order: bool) -> Self {
        self.fixed_order = fixed_order;
        self
    }

    pub fn learn_perm(mut self, learn_perm: bool) -> Self {
        self.learn_perm = learn_perm;
        self
    }

    pub fn softmax_fn(mut self, softmax_fn: SoftmaxFn) -> Self {
        self.softmax_fn = softmax_fn;
        self
    }

    /// 문자열 이름으로 선택 함수 지정 (알 수 없는 이름은 오류)
    pub fn softmax_fn_name(self, name: &str) -> Result<Self> {
        Ok(self.softmax_fn(name.parse()?))
    }
}

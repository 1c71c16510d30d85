//! 행렬 곱 조합기: 팩터들의 (고정 또는 학습된) 순서의 곱

use crate::config::{ProductConfig, SoftmaxFn};
use crate::error::{ButterflyError, Result};
use crate::factors::{check_shape, AnyFactor, Butterfly, Factor};
use crate::ops::complex::matmul_op;
use crate::ops::selection_probs;
use ndarray::{Array2, ArrayD, ArrayView1, ArrayViewMut2};
use rand::Rng;
use rand_distr::StandardNormal;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// 팩터 순서 결정 방식
#[derive(Debug, Clone, PartialEq)]
pub enum FactorOrder {
    /// 목록 순서 그대로 곱한다
    Fixed,
    /// 항마다 (n_terms x n_factors) logit의 softmax/sparsemax로 팩터를 고른다
    Learned {
        logit: Array2<f32>,
        softmax_fn: SoftmaxFn,
    },
}

/// 팩터 곱 M = F_0 · F_1 · ... (오른쪽 팩터가 벡터에 먼저 적용됨)
#[derive(Debug, Clone)]
pub struct MatrixProduct {
    factors: Vec<AnyFactor>,
    n_terms: usize,
    complex: bool,
    order: FactorOrder,
}

/// 확률 가중 합: sum_b prob[b] * items[b]
fn weighted_sum(prob: ArrayView1<f32>, items: &[ArrayD<f32>]) -> ArrayD<f32> {
    let mut acc = ArrayD::<f32>::zeros(items[0].raw_dim());
    for (&p, item) in prob.iter().zip(items) {
        if p != 0.0 {
            acc.scaled_add(p, item);
        }
    }
    acc
}

impl MatrixProduct {
    /// 설정에 따라 조합기 생성 (학습 순서 모드의 logit은 표준정규 초기화)
    pub fn new(factors: Vec<AnyFactor>, config: &ProductConfig) -> Result<Self> {
        Self::with_rng(factors, config, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(factors: Vec<AnyFactor>, config: &ProductConfig, rng: &mut R) -> Result<Self> {
        Self::validate(&factors, config.complex)?;
        let n_factors = factors.len();
        let n_terms = config.n_terms.unwrap_or(n_factors);
        if n_terms == 0 {
            return Err(ButterflyError::InvalidTerms);
        }
        let order = if config.fixed_order {
            FactorOrder::Fixed
        } else {
            let logit = Array2::from_shape_fn((n_terms, n_factors), |_| rng.sample::<f32, _>(StandardNormal));
            FactorOrder::Learned {
                logit,
                softmax_fn: config.softmax_fn,
            }
        };
        log::debug!(
            "MatrixProduct: {} factors of size {}, {} terms, order={}",
            n_factors,
            factors[0].size(),
            n_terms,
            if config.fixed_order { "fixed" } else { "learned" }
        );
        Ok(MatrixProduct {
            factors,
            n_terms,
            complex: config.complex,
            order,
        })
    }

    /// 고정 순서 곱
    pub fn fixed(factors: Vec<AnyFactor>, complex: bool) -> Result<Self> {
        let config = ProductConfig::new().complex(complex).fixed_order(true);
        Self::new(factors, &config)
    }

    fn validate(factors: &[AnyFactor], complex: bool) -> Result<()> {
        let first = factors.first().ok_or(ButterflyError::EmptyFactors)?;
        let size = first.size();
        for (index, factor) in factors.iter().enumerate() {
            if factor.size() != size {
                return Err(ButterflyError::FactorMismatch {
                    index,
                    reason: format!("size {} != {}", factor.size(), size),
                });
            }
            if factor.is_complex() != complex {
                return Err(ButterflyError::FactorMismatch {
                    index,
                    reason: format!("complex={} but product complex={}", factor.is_complex(), complex),
                });
            }
        }
        Ok(())
    }

    pub fn factors(&self) -> &[AnyFactor] {
        &self.factors
    }

    /// index번째 버터플라이 팩터의 파라미터 접근
    ///
    /// 팩터 자체를 교체할 수는 없으므로 크기와 복소 여부는 생성 시점 그대로 유지된다.
    pub fn butterfly_mut(&mut self, index: usize) -> Option<&mut Butterfly> {
        self.factors.get_mut(index).and_then(AnyFactor::as_butterfly_mut)
    }

    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    pub fn is_fixed_order(&self) -> bool {
        matches!(self.order, FactorOrder::Fixed)
    }

    pub fn order(&self) -> &FactorOrder {
        &self.order
    }

    pub fn logit(&self) -> Option<&Array2<f32>> {
        match &self.order {
            FactorOrder::Learned { logit, .. } => Some(logit),
            FactorOrder::Fixed => None,
        }
    }

    pub fn logit_mut(&mut self) -> Option<ArrayViewMut2<'_, f32>> {
        match &mut self.order {
            FactorOrder::Learned { logit, .. } => Some(logit.view_mut()),
            FactorOrder::Fixed => None,
        }
    }

    /// 선택 logit 설정 (학습 순서 모드에서만, shape은 (n_terms, n_factors))
    pub fn set_logit(&mut self, value: &Array2<f32>) -> Result<()> {
        match &mut self.order {
            FactorOrder::Learned { logit, .. } => {
                check_shape("logit", logit.shape(), value.shape())?;
                logit.assign(value);
                Ok(())
            }
            FactorOrder::Fixed => Err(ButterflyError::ShapeMismatch {
                name: "logit",
                expected: vec![],
                actual: value.shape().to_vec(),
            }),
        }
    }

    /// 항별 팩터 선택 확률 (n_terms x n_factors). 고정 순서면 None.
    pub fn probabilities(&self, temperature: f32) -> Option<Array2<f32>> {
        match &self.order {
            FactorOrder::Learned { logit, softmax_fn } => Some(selection_probs(logit.view(), temperature, *softmax_fn)),
            FactorOrder::Fixed => None,
        }
    }

    fn chain(&self, matrices: Vec<ArrayD<f32>>) -> Result<ArrayD<f32>> {
        let mut iter = matrices.into_iter();
        let mut acc = iter.next().ok_or(ButterflyError::EmptyFactors)?;
        for m in iter {
            acc = matmul_op(acc.view(), m.view(), self.complex)?;
        }
        Ok(acc)
    }
}

impl Factor for MatrixProduct {
    fn size(&self) -> usize {
        self.factors[0].size()
    }

    fn is_complex(&self) -> bool {
        self.complex
    }

    /// 고정 순서: 팩터 행렬의 순서대로의 곱.
    /// 학습 순서: 항마다 후보 행렬들의 확률 가중 평균을 만든 뒤 그 곱.
    fn matrix(&self, temperature: f32) -> Result<ArrayD<f32>> {
        #[cfg(feature = "parallel")]
        let matrices = self
            .factors
            .par_iter()
            .map(|f| f.matrix(temperature))
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let matrices = self
            .factors
            .iter()
            .map(|f| f.matrix(temperature))
            .collect::<Result<Vec<_>>>()?;
        match self.probabilities(temperature) {
            None => self.chain(matrices),
            Some(prob) => {
                let terms = prob
                    .outer_iter()
                    .map(|row| weighted_sum(row, &matrices))
                    .collect();
                self.chain(terms)
            }
        }
    }

    /// 고정 순서: 마지막 팩터부터 차례로 직접 적용.
    /// 학습 순서: 마지막 항부터, 각 후보 팩터를 현재 벡터에 적용한 결과의 확률 가중 평균.
    /// 이 경로는 온도가 0에 가까운 경우(하드 선택)에만 `matrix()`와 정확히 일치한다.
    fn forward(&self, input: &ArrayD<f32>, temperature: f32) -> Result<ArrayD<f32>> {
        let mut output = input.clone();
        match self.probabilities(temperature) {
            None => {
                for factor in self.factors.iter().rev() {
                    output = factor.forward(&output, temperature)?;
                }
            }
            Some(prob) => {
                for i in (0..self.n_terms).rev() {
                    let candidates = self
                        .factors
                        .iter()
                        .map(|f| f.forward(&output, temperature))
                        .collect::<Result<Vec<_>>>()?;
                    output = weighted_sum(prob.row(i), &candidates);
                }
            }
        }
        Ok(output)
    }
}

//! 버터플라이 곱: log2(n)개의 버터플라이 팩터와 선택적인 순열

use super::product::MatrixProduct;
use crate::config::{Constants, ProductConfig};
use crate::error::{ButterflyError, Result};
use crate::factors::{check_shape, AnyFactor, Butterfly, Factor, Permutation};
use crate::ops::complex::{apply_dense, matmul_op, real_matmul};
use crate::ops::sinkhorn;
use crate::utils::numeric::log2_exact;
use ndarray::{stack, Array2, ArrayD, Axis, Ix2};
use rand::Rng;
use rand_distr::StandardNormal;

/// 버터플라이 단계 앞뒤의 재배열 방식
#[derive(Debug, Clone, PartialEq)]
pub enum Reordering {
    Identity,
    /// Sinkhorn으로 완화된 학습 순열 (입력에 먼저 적용)
    Learned { logit: Array2<f32> },
    /// 비트 반전 순열 (`first`면 버터플라이 단계 이전, 아니면 이후)
    BitReversal { perm: Permutation, first: bool },
}

/// 대각선 간격이 2^(m-1), ..., 1인 m개 버터플라이 팩터의 곱
#[derive(Debug, Clone)]
pub struct ButterflyProduct {
    product: MatrixProduct,
    reordering: Reordering,
}

impl ButterflyProduct {
    /// 무작위 초기화된 버터플라이 곱 (size는 2의 거듭제곱)
    pub fn new(size: usize, config: &ProductConfig) -> Result<Self> {
        Self::with_rng(size, config, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(size: usize, config: &ProductConfig, rng: &mut R) -> Result<Self> {
        let m = Self::check_size(size)?;
        let factors = (0..m)
            .rev()
            .map(|i| Butterfly::with_rng(size, 1 << i, config.complex, rng).map(AnyFactor::from))
            .collect::<Result<Vec<_>>>()?;
        let config = ProductConfig {
            n_terms: Some(config.n_terms.unwrap_or(m)),
            ..config.clone()
        };
        let product = MatrixProduct::with_rng(factors, &config, rng)?;
        let reordering = if config.learn_perm {
            Reordering::Learned {
                logit: Array2::from_shape_fn((size, size), |_| rng.sample::<f32, _>(StandardNormal)),
            }
        } else {
            Reordering::Identity
        };
        log::debug!(
            "ButterflyProduct: size={}, complex={}, learn_perm={}",
            size,
            config.complex,
            config.learn_perm
        );
        Ok(ButterflyProduct { product, reordering })
    }

    /// 주입된 버터플라이 팩터들의 고정 순서 곱 (특수 생성기용)
    ///
    /// 팩터 목록은 행렬 곱 순서이며 마지막 팩터가 입력에 먼저 적용된다.
    pub fn from_factors(factors: Vec<Butterfly>, complex: bool, reordering: Reordering) -> Result<Self> {
        let size = factors.first().map(Factor::size).ok_or(ButterflyError::EmptyFactors)?;
        Self::check_size(size)?;
        match &reordering {
            Reordering::Identity => {}
            Reordering::Learned { logit } => check_shape("perm_logit", &[size, size], logit.shape())?,
            Reordering::BitReversal { perm, .. } => check_shape("perm", &[size], &[perm.size()])?,
        }
        let factors = factors.into_iter().map(AnyFactor::from).collect();
        let product = MatrixProduct::fixed(factors, complex)?;
        Ok(ButterflyProduct { product, reordering })
    }

    pub(crate) fn check_size(size: usize) -> Result<usize> {
        match log2_exact(size) {
            Some(0) => Err(ButterflyError::InvalidSize(size)),
            Some(m) => Ok(m),
            None => Err(ButterflyError::NotPowerOfTwo(size)),
        }
    }

    pub fn product(&self) -> &MatrixProduct {
        &self.product
    }

    /// index번째 버터플라이 팩터 (행렬 곱 순서)
    pub fn butterfly_mut(&mut self, index: usize) -> Option<&mut Butterfly> {
        self.product.butterfly_mut(index)
    }

    /// 팩터 선택 logit 설정 (학습 순서 모드에서만)
    pub fn set_logit(&mut self, value: &Array2<f32>) -> Result<()> {
        self.product.set_logit(value)
    }

    pub fn reordering(&self) -> &Reordering {
        &self.reordering
    }

    /// 학습 순열 logit (learn_perm일 때만)
    pub fn perm_logit(&self) -> Option<&Array2<f32>> {
        match &self.reordering {
            Reordering::Learned { logit } => Some(logit),
            _ => None,
        }
    }

    pub fn set_perm_logit(&mut self, value: &Array2<f32>) -> Result<()> {
        let size = self.size();
        match &mut self.reordering {
            Reordering::Learned { logit } => {
                check_shape("perm_logit", logit.shape(), value.shape())?;
                logit.assign(value);
                Ok(())
            }
            _ => Err(ButterflyError::ShapeMismatch {
                name: "perm_logit",
                expected: vec![size, size],
                actual: value.shape().to_vec(),
            }),
        }
    }

    /// 온도가 적용된 Sinkhorn 소프트 순열
    pub fn soft_permutation(&self, temperature: f32) -> Result<Option<Array2<f32>>> {
        match &self.reordering {
            Reordering::Learned { logit } => {
                let scaled = logit.mapv(|v| v / temperature).into_dyn();
                let perm = sinkhorn(scaled.view(), Constants::DEFAULT_SINKHORN_ITERS)?;
                Ok(Some(perm.into_dimensionality::<Ix2>()?))
            }
            _ => Ok(None),
        }
    }

    /// 밀집 행렬 M(실수 또는 복소)에 실수 행렬 P를 오른쪽에서 곱한다
    fn right_mul_real(&self, matrix: &ArrayD<f32>, perm: &Array2<f32>) -> Result<ArrayD<f32>> {
        let perm = perm.view().into_dyn();
        if !self.is_complex() {
            return real_matmul(matrix.view(), perm);
        }
        let re = real_matmul(matrix.index_axis(Axis(2), 0), perm.view())?;
        let im = real_matmul(matrix.index_axis(Axis(2), 1), perm.view())?;
        Ok(stack(Axis(2), &[re.view(), im.view()])?)
    }

    /// 실수 행렬 P를 입력 배치에 적용 (복소 입력은 실수부/허수부 각각)
    fn apply_real(&self, input: &ArrayD<f32>, perm: &Array2<f32>) -> Result<ArrayD<f32>> {
        let perm = perm.view().into_dyn();
        if !self.is_complex() {
            return apply_dense(input.view(), perm, false);
        }
        let last = Axis(input.ndim() - 1);
        let re = apply_dense(input.index_axis(last, 0), perm.view(), false)?;
        let im = apply_dense(input.index_axis(last, 1), perm.view(), false)?;
        Ok(stack(last, &[re.view(), im.view()])?)
    }
}

impl Factor for ButterflyProduct {
    fn size(&self) -> usize {
        self.product.size()
    }

    fn is_complex(&self) -> bool {
        self.product.is_complex()
    }

    fn matrix(&self, temperature: f32) -> Result<ArrayD<f32>> {
        let matrix = self.product.matrix(temperature)?;
        match &self.reordering {
            Reordering::Identity => Ok(matrix),
            Reordering::Learned { .. } => match self.soft_permutation(temperature)? {
                Some(perm) => self.right_mul_real(&matrix, &perm),
                None => Ok(matrix),
            },
            Reordering::BitReversal { perm, first } => {
                let p = perm.matrix(temperature)?;
                if *first {
                    matmul_op(matrix.view(), p.view(), self.is_complex())
                } else {
                    matmul_op(p.view(), matrix.view(), self.is_complex())
                }
            }
        }
    }

    fn forward(&self, input: &ArrayD<f32>, temperature: f32) -> Result<ArrayD<f32>> {
        match &self.reordering {
            Reordering::Identity => self.product.forward(input, temperature),
            Reordering::Learned { .. } => {
                let permuted = match self.soft_permutation(temperature)? {
                    Some(perm) => self.apply_real(input, &perm)?,
                    None => input.clone(),
                };
                self.product.forward(&permuted, temperature)
            }
            Reordering::BitReversal { perm, first: true } => {
                let permuted = perm.forward(input, temperature)?;
                self.product.forward(&permuted, temperature)
            }
            Reordering::BitReversal { perm, first: false } => {
                let output = self.product.forward(input, temperature)?;
                perm.forward(&output, temperature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::complex::complex_matmul;
    use crate::utils::numeric::{allclose, allclose_with};
    use ndarray::{array, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn randn(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(shape), |_| rng.sample::<f32, _>(StandardNormal))
    }

    #[test]
    fn factors_have_descending_offsets() {
        let model = ButterflyProduct::new(16, &ProductConfig::new()).unwrap();
        let offsets: Vec<usize> = model
            .product()
            .factors()
            .iter()
            .map(|f| f.as_butterfly().unwrap().diagonal())
            .collect();
        assert_eq!(offsets, vec![8, 4, 2, 1]);
        assert_eq!(model.product().n_terms(), 4);
        assert_eq!(model.product().logit().unwrap().shape(), &[4, 4]);
    }

    #[test]
    fn rejects_non_power_of_two_size() {
        assert!(matches!(
            ButterflyProduct::new(12, &ProductConfig::new()),
            Err(ButterflyError::NotPowerOfTwo(12))
        ));
        assert!(matches!(
            ButterflyProduct::new(1, &ProductConfig::new()),
            Err(ButterflyError::InvalidSize(1))
        ));
    }

    #[test]
    fn one_hot_selection_matches_factor_product() {
        let mut rng = StdRng::seed_from_u64(20);
        let mut model = ButterflyProduct::with_rng(4, &ProductConfig::new().complex(true), &mut rng).unwrap();
        model
            .set_logit(&array![[1.0f32, f32::NEG_INFINITY], [f32::NEG_INFINITY, 1.0]])
            .unwrap();
        let factors = model.product().factors();
        let expected = complex_matmul(
            factors[0].matrix(1.0).unwrap().view(),
            factors[1].matrix(1.0).unwrap().view(),
        )
        .unwrap();
        let m = model.matrix(1.0).unwrap();
        assert!(allclose(&m, &expected));

        let x = randn(&[3, 4, 2], &mut rng);
        let dense = apply_dense(x.view(), m.view(), true).unwrap();
        assert!(allclose_with(&model.forward(&x, 1.0).unwrap(), &dense, 1e-4, 1e-4));
    }

    #[test]
    fn learned_permutation_is_consistent_for_fixed_order() {
        let mut rng = StdRng::seed_from_u64(21);
        for &complex in &[false, true] {
            let config = ProductConfig::new().complex(complex).fixed_order(true).learn_perm(true);
            let model = ButterflyProduct::with_rng(8, &config, &mut rng).unwrap();
            assert_eq!(model.perm_logit().unwrap().shape(), &[8, 8]);
            let m = model.matrix(0.5).unwrap();
            let shape: Vec<usize> = if complex { vec![4, 8, 2] } else { vec![4, 8] };
            let x = randn(&shape, &mut rng);
            let dense = apply_dense(x.view(), m.view(), complex).unwrap();
            assert!(allclose_with(&model.forward(&x, 0.5).unwrap(), &dense, 1e-3, 1e-3));
        }
    }

    #[test]
    fn hard_permutation_logit_recovers_permutation() {
        let mut rng = StdRng::seed_from_u64(22);
        let config = ProductConfig::new().fixed_order(true).learn_perm(true);
        let mut model = ButterflyProduct::with_rng(4, &config, &mut rng).unwrap();
        // 순열 [1, 0, 3, 2]에 큰 logit
        let mut logit = Array2::<f32>::zeros((4, 4));
        for (i, j) in [(0, 1), (1, 0), (2, 3), (3, 2)] {
            logit[[i, j]] = 10.0;
        }
        model.set_perm_logit(&logit).unwrap();
        let perm = model.soft_permutation(0.1).unwrap().unwrap();
        let expected = array![
            [0.0f32, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0]
        ];
        assert!(allclose_with(&perm, &expected, 0.0, 1e-4));
    }

    #[test]
    fn perm_logit_requires_learned_permutation() {
        let mut model = ButterflyProduct::new(4, &ProductConfig::new()).unwrap();
        assert!(model.perm_logit().is_none());
        assert!(model.set_perm_logit(&Array2::zeros((4, 4))).is_err());
        assert!(model.soft_permutation(1.0).unwrap().is_none());
    }
}


//! 버터플라이 선형 레이어 구현

use ndarray::{s, Array1, Array2, ArrayD, Ix2};

use super::butterfly_product::ButterflyProduct;
use crate::config::ProductConfig;
use crate::error::{ButterflyError, Result};
use crate::factors::{Butterfly, Factor};
use crate::utils::numeric::next_pow2;

/// 밀집 선형 레이어를 대체하는 버터플라이 레이어
///
/// 가중치는 크기 `next_pow2(max(in, out))`의 버터플라이 곱이며,
/// 입력은 0으로 채워 늘리고 출력은 `out_features`까지 자른다.
#[derive(Debug, Clone)]
pub struct ButterflyLinear {
    /// 입력 차원
    in_features: usize,
    /// 출력 차원
    out_features: usize,
    /// 가중치 구조
    butterfly: ButterflyProduct,
    /// 편향 벡터
    bias: Option<Array1<f32>>,
}

impl ButterflyLinear {
    /// 새 버터플라이 레이어 생성
    pub fn new(in_features: usize, out_features: usize, use_bias: bool, config: &ProductConfig) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(ButterflyError::InvalidSize(in_features.min(out_features)));
        }
        let config = ProductConfig {
            complex: false,
            ..config.clone()
        };
        let size = next_pow2(in_features.max(out_features)).max(2);
        let butterfly = ButterflyProduct::new(size, &config)?;

        let bias = if use_bias {
            Some(Array1::zeros(out_features).mapv(|_: f32| rand::random::<f32>() * 0.1))
        } else {
            None
        };

        Ok(ButterflyLinear {
            in_features,
            out_features,
            butterfly,
            bias,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn butterfly(&self) -> &ButterflyProduct {
        &self.butterfly
    }

    /// 가중치를 이루는 index번째 버터플라이 팩터
    pub fn butterfly_mut(&mut self, index: usize) -> Option<&mut Butterfly> {
        self.butterfly.butterfly_mut(index)
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// 유효 가중치 (out_features, in_features)
    pub fn weight(&self, temperature: f32) -> Result<Array2<f32>> {
        let matrix = self.butterfly.matrix(temperature)?.into_dimensionality::<Ix2>()?;
        Ok(matrix.slice(s![..self.out_features, ..self.in_features]).to_owned())
    }

    /// 순전파 (forward pass): x (batch, in) -> (batch, out)
    pub fn forward(&self, x: &Array2<f32>, temperature: f32) -> Result<Array2<f32>> {
        if x.ncols() != self.in_features {
            return Err(ButterflyError::ShapeMismatch {
                name: "input",
                expected: vec![x.nrows(), self.in_features],
                actual: x.shape().to_vec(),
            });
        }
        let size = self.butterfly.size();
        let mut padded = Array2::<f32>::zeros((x.nrows(), size));
        padded.slice_mut(s![.., ..self.in_features]).assign(x);

        let output: ArrayD<f32> = self.butterfly.forward(&padded.into_dyn(), temperature)?;
        let output = output.into_dimensionality::<Ix2>()?;
        let mut result = output.slice(s![.., ..self.out_features]).to_owned();

        // 편향 추가 (있는 경우)
        if let Some(b) = &self.bias {
            result += b;
        }
        Ok(result)
    }

    /// 편향 업데이트
    pub fn update_bias(&mut self, grad_bias: &Array1<f32>, learning_rate: f32) -> Result<()> {
        if let Some(bias) = &mut self.bias {
            if grad_bias.len() != bias.len() {
                return Err(ButterflyError::ShapeMismatch {
                    name: "grad_bias",
                    expected: vec![bias.len()],
                    actual: grad_bias.shape().to_vec(),
                });
            }
            bias.scaled_add(-learning_rate, grad_bias);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::numeric::allclose_with;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    #[test]
    fn forward_matches_effective_weight() {
        let mut rng = StdRng::seed_from_u64(30);
        let layer = ButterflyLinear::new(5, 3, true, &ProductConfig::new().fixed_order(true)).unwrap();
        assert_eq!(layer.butterfly().size(), 8);
        let x = Array2::from_shape_fn((4, 5), |_| rng.sample::<f32, _>(StandardNormal));
        let w = layer.weight(1.0).unwrap();
        assert_eq!(w.shape(), &[3, 5]);
        let expected = x.dot(&w.t()) + layer.bias().unwrap();
        let y = layer.forward(&x, 1.0).unwrap();
        assert!(allclose_with(&y, &expected, 1e-4, 1e-4));
    }

    #[test]
    fn rejects_wrong_input_width() {
        let layer = ButterflyLinear::new(4, 4, false, &ProductConfig::new()).unwrap();
        assert!(layer.forward(&Array2::zeros((2, 3)), 1.0).is_err());
        assert!(ButterflyLinear::new(0, 4, false, &ProductConfig::new()).is_err());
    }

    #[test]
    fn update_bias_steps_against_gradient() {
        let mut layer = ButterflyLinear::new(2, 2, true, &ProductConfig::new()).unwrap();
        let before = layer.bias().unwrap().clone();
        layer.update_bias(&Array1::ones(2), 0.5).unwrap();
        let after = layer.bias().unwrap();
        assert!(((&before - after).mapv(f32::abs) - 0.5).iter().all(|d| d.abs() < 1e-6));
        assert!(layer.update_bias(&Array1::ones(3), 0.5).is_err());
    }
}

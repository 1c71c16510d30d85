//! 버터플라이 팩터: 주대각선과 k번째 부/초대각선만 0이 아닌 행렬

use super::{check_input, check_shape, with_pair, Factor};
use crate::config::constants::Constants;
use crate::error::{ButterflyError, Result};
use crate::ops::complex::{complex_conj, mul_op};
use ndarray::{Array2, Array3, ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, Slice};
use rand::Rng;
use rand_distr::StandardNormal;

/// 버터플라이 행렬 (n x n)
///
/// 대각선 `diag`(길이 n), 부대각선 `subdiag`과 초대각선 `superdiag`(길이 n-k)이
/// 파라미터이며, 복소 행렬이면 각 벡터 뒤에 (실수부, 허수부) 축이 붙는다.
#[derive(Debug, Clone, PartialEq)]
pub struct Butterfly {
    size: usize,
    diagonal: usize,
    complex: bool,
    diag: ArrayD<f32>,
    subdiag: ArrayD<f32>,
    superdiag: ArrayD<f32>,
}

/// 버터플라이 파라미터에 대한 기울기
#[derive(Debug, Clone, PartialEq)]
pub struct ButterflyGrad {
    pub diag: ArrayD<f32>,
    pub subdiag: ArrayD<f32>,
    pub superdiag: ArrayD<f32>,
}

/// 선두 배치 축들을 합산하여 `trailing` 개의 뒤쪽 축만 남긴다
fn sum_leading(x: ArrayD<f32>, trailing: usize) -> Result<ArrayD<f32>> {
    let split = x.ndim() - trailing;
    let tail = x.shape()[split..].to_vec();
    let batch: usize = x.shape()[..split].iter().product();
    let width: usize = tail.iter().product();
    let flat = x.as_standard_layout().into_owned().into_shape((batch, width))?;
    Ok(flat.sum_axis(Axis(0)).into_shape(IxDyn(&tail))?)
}

/// 대각/밴드 파라미터로 입력 배치에 직접 적용
///
/// out[i] = diag[i]*x[i] + sub[i-k]*x[i-k] (i >= k) + sup[i]*x[i+k] (i < n-k)
fn band_apply(
    diag: ArrayViewD<f32>,
    sub: ArrayViewD<f32>,
    sup: ArrayViewD<f32>,
    input: ArrayViewD<f32>,
    n_axis: usize,
    k: usize,
    complex: bool,
) -> Result<ArrayD<f32>> {
    let n = input.shape()[n_axis];
    let axis = Axis(n_axis);
    let mut output = mul_op(diag, input.view(), complex)?;

    let sub_term = mul_op(sub, input.slice_axis(axis, Slice::from(..n - k)), complex)?;
    let mut lower = output.slice_axis_mut(axis, Slice::from(k..));
    lower += &sub_term;

    let sup_term = mul_op(sup, input.slice_axis(axis, Slice::from(k..)), complex)?;
    let mut upper = output.slice_axis_mut(axis, Slice::from(..n - k));
    upper += &sup_term;

    Ok(output)
}

impl Butterfly {
    /// 무작위 초기화된 버터플라이 팩터 생성
    pub fn new(size: usize, diagonal: usize, complex: bool) -> Result<Self> {
        Self::with_rng(size, diagonal, complex, &mut rand::thread_rng())
    }

    /// 주어진 난수 생성기로 표준정규 초기화
    pub fn with_rng<R: Rng + ?Sized>(size: usize, diagonal: usize, complex: bool, rng: &mut R) -> Result<Self> {
        Self::check_diagonal(size, diagonal)?;
        let mut randn = |shape: Vec<usize>| {
            ArrayD::from_shape_fn(IxDyn(&shape), |_| {
                Constants::INIT_STD * rng.sample::<f32, _>(StandardNormal)
            })
        };
        let diag = randn(with_pair(size, complex));
        let subdiag = randn(with_pair(size - diagonal, complex));
        let superdiag = randn(with_pair(size - diagonal, complex));
        Ok(Butterfly {
            size,
            diagonal,
            complex,
            diag,
            subdiag,
            superdiag,
        })
    }

    /// 명시적인 파라미터로 생성 (shape이 정확히 맞아야 함)
    pub fn from_params(
        size: usize,
        diagonal: usize,
        complex: bool,
        diag: ArrayD<f32>,
        subdiag: ArrayD<f32>,
        superdiag: ArrayD<f32>,
    ) -> Result<Self> {
        Self::check_diagonal(size, diagonal)?;
        check_shape("diag", &with_pair(size, complex), diag.shape())?;
        check_shape("subdiag", &with_pair(size - diagonal, complex), subdiag.shape())?;
        check_shape("superdiag", &with_pair(size - diagonal, complex), superdiag.shape())?;
        Ok(Butterfly {
            size,
            diagonal,
            complex,
            diag,
            subdiag,
            superdiag,
        })
    }

    fn check_diagonal(size: usize, diagonal: usize) -> Result<()> {
        if diagonal == 0 || size <= diagonal {
            return Err(ButterflyError::InvalidDiagonal { size, diagonal });
        }
        Ok(())
    }

    pub fn diagonal(&self) -> usize {
        self.diagonal
    }

    pub fn diag(&self) -> &ArrayD<f32> {
        &self.diag
    }

    pub fn subdiag(&self) -> &ArrayD<f32> {
        &self.subdiag
    }

    pub fn superdiag(&self) -> &ArrayD<f32> {
        &self.superdiag
    }

    /// 옵티마이저용 가변 뷰 (재할당 없음)
    pub fn diag_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.diag.view_mut()
    }

    pub fn subdiag_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.subdiag.view_mut()
    }

    pub fn superdiag_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.superdiag.view_mut()
    }

    pub fn set_diag(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        check_shape("diag", self.diag.shape(), value.shape())?;
        self.diag.assign(&value);
        Ok(())
    }

    pub fn set_subdiag(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        check_shape("subdiag", self.subdiag.shape(), value.shape())?;
        self.subdiag.assign(&value);
        Ok(())
    }

    pub fn set_superdiag(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        check_shape("superdiag", self.superdiag.shape(), value.shape())?;
        self.superdiag.assign(&value);
        Ok(())
    }

    /// 열 스케일링: self <- self · diag(scale)
    ///
    /// scale: (n,) 또는 (n, 2). 원형 행렬 생성기에서 대각 행렬을 마지막
    /// 버터플라이 팩터에 흡수할 때 쓴다.
    pub fn scale_columns(&mut self, scale: ArrayViewD<f32>) -> Result<()> {
        check_shape("scale", &with_pair(self.size, self.complex), scale.shape())?;
        let (n, k) = (self.size, self.diagonal);
        let head = scale.slice_axis(Axis(0), Slice::from(..n - k));
        let tail = scale.slice_axis(Axis(0), Slice::from(k..));
        let diag = mul_op(self.diag.view(), scale.view(), self.complex)?;
        // (r+k, r) 항은 열 r, (r, r+k) 항은 열 r+k
        let subdiag = mul_op(self.subdiag.view(), head, self.complex)?;
        let superdiag = mul_op(self.superdiag.view(), tail, self.complex)?;
        self.diag.assign(&diag);
        self.subdiag.assign(&subdiag);
        self.superdiag.assign(&superdiag);
        Ok(())
    }

    /// 역전파: 파라미터 기울기와 입력 기울기
    ///
    /// 복소 행렬은 실수 쌍에 대한 기울기 규약을 따르므로
    /// 입력 기울기는 B^H g, 파라미터 기울기는 g * conj(x)의 배치 합이다.
    pub fn backward(&self, input: &ArrayD<f32>, grad_output: &ArrayD<f32>) -> Result<(ButterflyGrad, ArrayD<f32>)> {
        let n_axis = check_input(input.view(), self.size, self.complex)?;
        check_shape("grad_output", input.shape(), grad_output.shape())?;
        let (n, k) = (self.size, self.diagonal);
        let axis = Axis(n_axis);
        let trailing = if self.complex { 2 } else { 1 };

        let conj = |a: ArrayViewD<f32>| -> Result<ArrayD<f32>> {
            if self.complex {
                complex_conj(a)
            } else {
                Ok(a.to_owned())
            }
        };

        let grad_input = band_apply(
            conj(self.diag.view())?.view(),
            conj(self.superdiag.view())?.view(),
            conj(self.subdiag.view())?.view(),
            grad_output.view(),
            n_axis,
            k,
            self.complex,
        )?;

        let x_conj = conj(input.view())?;
        let g = grad_output.view();
        let grad_diag = mul_op(g.view(), x_conj.view(), self.complex)?;
        let grad_sub = mul_op(
            g.slice_axis(axis, Slice::from(k..)),
            x_conj.slice_axis(axis, Slice::from(..n - k)),
            self.complex,
        )?;
        let grad_sup = mul_op(
            g.slice_axis(axis, Slice::from(..n - k)),
            x_conj.slice_axis(axis, Slice::from(k..)),
            self.complex,
        )?;

        let grad = ButterflyGrad {
            diag: sum_leading(grad_diag, trailing)?,
            subdiag: sum_leading(grad_sub, trailing)?,
            superdiag: sum_leading(grad_sup, trailing)?,
        };
        Ok((grad, grad_input))
    }

    /// SGD 업데이트 (제자리 갱신)
    pub fn apply_gradients(&mut self, grad: &ButterflyGrad, learning_rate: f32) -> Result<()> {
        check_shape("grad.diag", self.diag.shape(), grad.diag.shape())?;
        check_shape("grad.subdiag", self.subdiag.shape(), grad.subdiag.shape())?;
        check_shape("grad.superdiag", self.superdiag.shape(), grad.superdiag.shape())?;
        self.diag.scaled_add(-learning_rate, &grad.diag);
        self.subdiag.scaled_add(-learning_rate, &grad.subdiag);
        self.superdiag.scaled_add(-learning_rate, &grad.superdiag);
        Ok(())
    }
}

impl Factor for Butterfly {
    fn size(&self) -> usize {
        self.size
    }

    fn is_complex(&self) -> bool {
        self.complex
    }

    fn matrix(&self, _temperature: f32) -> Result<ArrayD<f32>> {
        let (n, k) = (self.size, self.diagonal);
        if !self.complex {
            let mut m = Array2::<f32>::zeros((n, n));
            for i in 0..n {
                m[[i, i]] = self.diag[[i]];
            }
            for r in 0..n - k {
                m[[r + k, r]] = self.subdiag[[r]];
                m[[r, r + k]] = self.superdiag[[r]];
            }
            return Ok(m.into_dyn());
        }
        let mut m = Array3::<f32>::zeros((n, n, 2));
        for c in 0..2 {
            for i in 0..n {
                m[[i, i, c]] = self.diag[[i, c]];
            }
            for r in 0..n - k {
                m[[r + k, r, c]] = self.subdiag[[r, c]];
                m[[r, r + k, c]] = self.superdiag[[r, c]];
            }
        }
        Ok(m.into_dyn())
    }

    fn forward(&self, input: &ArrayD<f32>, _temperature: f32) -> Result<ArrayD<f32>> {
        let n_axis = check_input(input.view(), self.size, self.complex)?;
        band_apply(
            self.diag.view(),
            self.subdiag.view(),
            self.superdiag.view(),
            input.view(),
            n_axis,
            self.diagonal,
            self.complex,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::complex::apply_dense;
    use crate::utils::numeric::allclose;
    use ndarray::{array, Array3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn randn(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(shape), |_| rng.sample::<f32, _>(StandardNormal))
    }

    #[test]
    fn complex_matrix_matches_known_values() {
        let diag = array![[1.0f32, 2.0], [2.0, 3.0], [3.0, 4.0], [4.0, 5.0]].into_dyn();
        let subdiag = array![[11.0f32, 12.0], [12.0, 13.0], [13.0, 14.0]].into_dyn();
        let model = Butterfly::from_params(4, 1, true, diag, subdiag.clone(), subdiag).unwrap();
        let matrix_real = array![
            [1.0f32, 11.0, 0.0, 0.0],
            [11.0, 2.0, 12.0, 0.0],
            [0.0, 12.0, 3.0, 13.0],
            [0.0, 0.0, 13.0, 4.0]
        ];
        let matrix_imag = array![
            [2.0f32, 12.0, 0.0, 0.0],
            [12.0, 3.0, 13.0, 0.0],
            [0.0, 13.0, 4.0, 14.0],
            [0.0, 0.0, 14.0, 5.0]
        ];
        let m = model.matrix(1.0).unwrap();
        assert_eq!(m.shape(), &[4, 4, 2]);
        assert_eq!(m.index_axis(Axis(2), 0), matrix_real.into_dyn());
        assert_eq!(m.index_axis(Axis(2), 1), matrix_imag.into_dyn());

        let mut rng = StdRng::seed_from_u64(0);
        let x = randn(&[3, 4, 2], &mut rng);
        let expected = apply_dense(x.view(), m.view(), true).unwrap();
        assert!(allclose(&model.forward(&x, 1.0).unwrap(), &expected));
    }

    #[test]
    fn real_forward_matches_dense_matrix() {
        let mut rng = StdRng::seed_from_u64(1);
        for &(size, k) in &[(8usize, 1usize), (8, 2), (8, 4), (5, 3)] {
            let model = Butterfly::with_rng(size, k, false, &mut rng).unwrap();
            let x = randn(&[2, 3, size], &mut rng);
            let expected = apply_dense(x.view(), model.matrix(1.0).unwrap().view(), false).unwrap();
            assert!(allclose(&model.forward(&x, 1.0).unwrap(), &expected));
        }
    }

    #[test]
    fn complex_forward_matches_dense_matrix() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = Butterfly::with_rng(8, 2, true, &mut rng).unwrap();
        let x = randn(&[5, 8, 2], &mut rng);
        let expected = apply_dense(x.view(), model.matrix(1.0).unwrap().view(), true).unwrap();
        assert!(allclose(&model.forward(&x, 1.0).unwrap(), &expected));
    }

    #[test]
    fn rejects_invalid_construction() {
        assert!(matches!(
            Butterfly::new(4, 4, false),
            Err(ButterflyError::InvalidDiagonal { size: 4, diagonal: 4 })
        ));
        assert!(matches!(
            Butterfly::new(4, 0, false),
            Err(ButterflyError::InvalidDiagonal { .. })
        ));
        let diag = ArrayD::<f32>::ones(IxDyn(&[4]));
        let band = ArrayD::<f32>::ones(IxDyn(&[2]));
        let err = Butterfly::from_params(4, 1, false, diag.clone(), band.clone(), band).unwrap_err();
        assert!(matches!(err, ButterflyError::ShapeMismatch { name: "subdiag", .. }));
        // 복소 행렬은 (len, 2) shape 필요
        let band = ArrayD::<f32>::ones(IxDyn(&[3]));
        let err = Butterfly::from_params(4, 1, true, diag, band.clone(), band).unwrap_err();
        assert!(matches!(err, ButterflyError::ShapeMismatch { name: "diag", .. }));
    }

    #[test]
    fn forward_rejects_wrong_input_size() {
        let model = Butterfly::new(4, 1, false).unwrap();
        let x = ArrayD::<f32>::zeros(IxDyn(&[2, 5]));
        assert!(model.forward(&x, 1.0).is_err());
    }

    #[test]
    fn setters_update_in_place() {
        let mut model = Butterfly::new(4, 2, false).unwrap();
        let ptr = model.diag().as_ptr();
        model.set_diag(array![1.0f32, 2.0, 3.0, 4.0].into_dyn().view()).unwrap();
        assert_eq!(model.diag().as_ptr(), ptr);
        assert_eq!(model.diag(), &array![1.0f32, 2.0, 3.0, 4.0].into_dyn());
        model.superdiag_mut().fill(0.5);
        assert!(model.superdiag().iter().all(|&v| v == 0.5));
        assert!(model.set_subdiag(array![1.0f32].into_dyn().view()).is_err());
    }

    #[test]
    fn scale_columns_equals_right_diagonal_product() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = Butterfly::with_rng(8, 2, true, &mut rng).unwrap();
        let scale = randn(&[8, 2], &mut rng);
        let before = model.matrix(1.0).unwrap();
        let ptrs = (model.diag().as_ptr(), model.subdiag().as_ptr(), model.superdiag().as_ptr());
        model.scale_columns(scale.view()).unwrap();
        assert_eq!((model.diag().as_ptr(), model.subdiag().as_ptr(), model.superdiag().as_ptr()), ptrs);
        let after = model.matrix(1.0).unwrap();
        let mut diag = Array3::<f32>::zeros((8, 8, 2));
        for i in 0..8 {
            diag[[i, i, 0]] = scale[[i, 0]];
            diag[[i, i, 1]] = scale[[i, 1]];
        }
        let expected =
            crate::ops::complex::complex_matmul(before.view(), diag.into_dyn().view()).unwrap();
        assert!(allclose(&after, &expected));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(4);
        for &complex in &[false, true] {
            let model = Butterfly::with_rng(4, 1, complex, &mut rng).unwrap();
            let shape: Vec<usize> = if complex { vec![3, 4, 2] } else { vec![3, 4] };
            let x = randn(&shape, &mut rng);
            let g = randn(&shape, &mut rng);
            // L = sum(g * forward(x))
            let loss = |m: &Butterfly, x: &ArrayD<f32>| -> f64 {
                let y = m.forward(x, 1.0).unwrap();
                y.iter().zip(g.iter()).map(|(&a, &b)| (a * b) as f64).sum()
            };
            let (grad, grad_input) = model.backward(&x, &g).unwrap();
            let grad_input = grad_input.as_standard_layout().into_owned();

            let eps = 1e-1f32;
            for idx in 0..grad.diag.len() {
                let mut plus = model.clone();
                let mut minus = model.clone();
                plus.diag_mut().as_slice_mut().unwrap()[idx] += eps;
                minus.diag_mut().as_slice_mut().unwrap()[idx] -= eps;
                let numeric = (loss(&plus, &x) - loss(&minus, &x)) / (2.0 * eps as f64);
                let analytic = grad.diag.as_slice().unwrap()[idx] as f64;
                assert!((numeric - analytic).abs() < 1e-2, "diag[{}]: {} vs {}", idx, numeric, analytic);
            }
            for idx in 0..grad.subdiag.len() {
                let mut plus = model.clone();
                let mut minus = model.clone();
                plus.subdiag_mut().as_slice_mut().unwrap()[idx] += eps;
                minus.subdiag_mut().as_slice_mut().unwrap()[idx] -= eps;
                let numeric = (loss(&plus, &x) - loss(&minus, &x)) / (2.0 * eps as f64);
                let analytic = grad.subdiag.as_slice().unwrap()[idx] as f64;
                assert!((numeric - analytic).abs() < 1e-2);
            }
            for idx in 0..x.len() {
                let mut xp = x.clone();
                let mut xm = x.clone();
                xp.as_slice_mut().unwrap()[idx] += eps;
                xm.as_slice_mut().unwrap()[idx] -= eps;
                let numeric = (loss(&model, &xp) - loss(&model, &xm)) / (2.0 * eps as f64);
                let analytic = grad_input.as_slice().unwrap()[idx] as f64;
                assert!((numeric - analytic).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn sgd_step_reduces_quadratic_loss() {
        let mut rng = StdRng::seed_from_u64(5);
        let target = Butterfly::with_rng(8, 4, false, &mut rng).unwrap();
        let mut model = Butterfly::with_rng(8, 4, false, &mut rng).unwrap();
        let x = randn(&[16, 8], &mut rng);
        let y = target.forward(&x, 1.0).unwrap();
        let mse = |m: &Butterfly| -> f32 {
            let diff = m.forward(&x, 1.0).unwrap() - &y;
            diff.mapv(|v| v * v).sum()
        };
        let before = mse(&model);
        for _ in 0..50 {
            let out = model.forward(&x, 1.0).unwrap();
            let grad_out = (out - &y) * 2.0;
            let (grad, _) = model.backward(&x, &grad_out).unwrap();
            model.apply_gradients(&grad, 1e-3).unwrap();
        }
        assert!(mse(&model) < before);
    }
}

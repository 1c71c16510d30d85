//! 원형(circulant) 행렬 곱의 버터플라이 팩터화
//!
//! C = IFFT · diag(FFT(col)) · FFT 분해에서 두 비트 반전이 서로 상쇄되므로
//! 순열 없이 역변환 단계, 대각 행렬, 정변환 단계만 남는다.

use super::{dif_stage, dit_stage, fft};
use crate::error::{ButterflyError, Result};
use crate::factors::{check_input, AnyFactor, Butterfly, Diagonal, Factor};
use crate::layers::MatrixProduct;
use crate::utils::numeric::{bit_reversal_permutation, is_pow2, log2_exact, next_pow2};
use ndarray::{s, Array2, ArrayD, Axis, Ix1, Ix2, Ix3, IxDyn, Slice};

/// 원형 행렬 곱 연산자
///
/// 크기가 2의 거듭제곱이 아니면 `next_pow2(2n - 1)` 크기의 원형 행렬에
/// 임베딩하고, 입력은 0으로 채워 늘린 뒤 출력을 다시 자른다.
#[derive(Debug, Clone)]
pub struct Circulant {
    size: usize,
    padded: usize,
    product: MatrixProduct,
}

impl Circulant {
    /// 내부 버터플라이 곱의 크기
    pub fn padded_size(&self) -> usize {
        self.padded
    }

    pub fn product(&self) -> &MatrixProduct {
        &self.product
    }
}

/// 실수 (n,) 또는 복소 (n, 2) 열을 복소 (n, 2)로
fn to_complex(col: &ArrayD<f32>) -> Result<Array2<f32>> {
    match col.shape() {
        [_] => {
            let re = col.view().into_dimensionality::<Ix1>()?;
            let mut out = Array2::<f32>::zeros((re.len(), 2));
            out.column_mut(0).assign(&re);
            Ok(out)
        }
        [_, 2] => Ok(col.view().into_dimensionality::<Ix2>()?.to_owned()),
        shape => Err(ButterflyError::ShapeMismatch {
            name: "col",
            expected: vec![shape.first().copied().unwrap_or(0), 2],
            actual: shape.to_vec(),
        }),
    }
}

/// 원형 행렬 C (C[i, j] = col[(i - j) mod n])와의 곱을 계산하는 팩터화
///
/// `transposed`면 입력을 첫 행으로 해석한다. `separate_diagonal`이면
/// 스펙트럼 대각 행렬을 별도 팩터로 두고, 아니면 인접한 버터플라이에 흡수한다.
pub fn circulant(col: &ArrayD<f32>, transposed: bool, separate_diagonal: bool) -> Result<Circulant> {
    let col = to_complex(col)?;
    let n = col.nrows();
    if n == 0 {
        return Err(ButterflyError::InvalidSize(0));
    }
    // 첫 행 r에 대해 col[t] = r[(-t) mod n]
    let col = if transposed {
        Array2::from_shape_fn((n, 2), |(t, c)| col[[(n - t) % n, c]])
    } else {
        col
    };

    let padded = if n >= 2 && is_pow2(n) {
        n
    } else {
        next_pow2(2 * n - 1).max(2)
    };
    let m = log2_exact(padded).ok_or(ButterflyError::NotPowerOfTwo(padded))?;
    let mut extended = Array2::<f32>::zeros((padded, 2));
    for t in 0..n {
        extended.row_mut(t).assign(&col.row(t));
    }
    for t in 1..n {
        extended.row_mut(padded - t).assign(&col.row(n - t));
    }

    // 역변환의 1/N 스케일을 대각 성분에 넣는다
    let spectrum = fft(padded, false, true)?.forward(&extended.insert_axis(Axis(0)).into_dyn(), 1.0)?;
    let br = bit_reversal_permutation(padded);
    let inv = 1.0 / padded as f32;
    let scale = ArrayD::from_shape_fn(IxDyn(&[padded, 2]), |idx| spectrum[[0, br[idx[0]], idx[1]]] * inv);

    let mut inverse = (0..m)
        .rev()
        .map(|i| dit_stage(padded, 1 << i, 1.0, 1.0))
        .collect::<Result<Vec<Butterfly>>>()?;
    let forward = (0..m)
        .map(|i| dif_stage(padded, 1 << i, -1.0, 1.0))
        .collect::<Result<Vec<Butterfly>>>()?;

    let mut factors: Vec<AnyFactor> = Vec::with_capacity(2 * m + 1);
    if separate_diagonal {
        factors.extend(inverse.into_iter().map(AnyFactor::from));
        factors.push(Diagonal::new(scale, true)?.into());
    } else {
        if let Some(last) = inverse.last_mut() {
            last.scale_columns(scale.view())?;
        }
        factors.extend(inverse.into_iter().map(AnyFactor::from));
    }
    factors.extend(forward.into_iter().map(AnyFactor::from));

    log::debug!(
        "circulant: n={}, padded={}, transposed={}, separate_diagonal={}",
        n,
        padded,
        transposed,
        separate_diagonal
    );
    let product = MatrixProduct::fixed(factors, true)?;
    Ok(Circulant { size: n, padded, product })
}

impl Factor for Circulant {
    fn size(&self) -> usize {
        self.size
    }

    fn is_complex(&self) -> bool {
        true
    }

    fn matrix(&self, temperature: f32) -> Result<ArrayD<f32>> {
        let full = self.product.matrix(temperature)?.into_dimensionality::<Ix3>()?;
        let n = self.size;
        Ok(full.slice(s![..n, ..n, ..]).to_owned().into_dyn())
    }

    fn forward(&self, input: &ArrayD<f32>, temperature: f32) -> Result<ArrayD<f32>> {
        let n_axis = check_input(input.view(), self.size, true)?;
        if self.padded == self.size {
            return self.product.forward(input, temperature);
        }
        let mut shape = input.shape().to_vec();
        shape[n_axis] = self.padded;
        let mut padded = ArrayD::<f32>::zeros(IxDyn(&shape));
        padded
            .slice_axis_mut(Axis(n_axis), Slice::from(..self.size))
            .assign(input);
        let output = self.product.forward(&padded, temperature)?;
        Ok(output.slice_axis(Axis(n_axis), Slice::from(..self.size)).to_owned())
    }
}

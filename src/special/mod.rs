//! 닫힌 형태의 버터플라이 생성기
//!
//! 이산 푸리에 변환, 역변환, 원형 행렬 곱을 정확히 계산하도록
//! 파라미터를 주입한 버터플라이 곱을 만든다. 팩터화 전체의 정확성 기준이 된다.

mod circulant;

pub use circulant::{circulant, Circulant};

use crate::error::Result;
use crate::factors::{Butterfly, Permutation};
use crate::layers::{ButterflyProduct, Reordering};
use ndarray::{ArrayD, IxDyn};
use num::complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// exp(sign * 2πi * j / (2k))
fn twiddle(j: usize, k: usize, sign: f64) -> Complex64 {
    Complex64::from_polar(1.0, sign * PI * j as f64 / k as f64)
}

fn set_entry(arr: &mut ArrayD<f32>, idx: usize, z: Complex64) {
    arr[[idx, 0]] = z.re as f32;
    arr[[idx, 1]] = z.im as f32;
}

/// 시간 솎음(decimation-in-time) 단계: 비트 반전된 입력에 간격 1, 2, ... 순으로 적용
///
/// 블록 안 위치 j < k에서 y[i] = x[i] + w^j x[i+k], y[i+k] = x[i] - w^j x[i+k].
pub(crate) fn dit_stage(n: usize, k: usize, sign: f64, scale: f64) -> Result<Butterfly> {
    let mut diag = ArrayD::<f32>::zeros(IxDyn(&[n, 2]));
    let mut subdiag = ArrayD::<f32>::zeros(IxDyn(&[n - k, 2]));
    let mut superdiag = ArrayD::<f32>::zeros(IxDyn(&[n - k, 2]));
    for i in 0..n {
        let j = i % (2 * k);
        let value = if j < k {
            Complex64::new(scale, 0.0)
        } else {
            -twiddle(j - k, k, sign) * scale
        };
        set_entry(&mut diag, i, value);
    }
    for r in 0..n - k {
        let j = r % (2 * k);
        if j < k {
            set_entry(&mut superdiag, r, twiddle(j, k, sign) * scale);
            set_entry(&mut subdiag, r, Complex64::new(scale, 0.0));
        }
    }
    Butterfly::from_params(n, k, true, diag, subdiag, superdiag)
}

/// 주파수 솎음(decimation-in-frequency) 단계: 자연 순서 입력에 간격 n/2, ... 순으로 적용
///
/// 블록 안 위치 j < k에서 y[i] = x[i] + x[i+k], y[i+k] = w^j (x[i] - x[i+k]).
pub(crate) fn dif_stage(n: usize, k: usize, sign: f64, scale: f64) -> Result<Butterfly> {
    let mut diag = ArrayD::<f32>::zeros(IxDyn(&[n, 2]));
    let mut subdiag = ArrayD::<f32>::zeros(IxDyn(&[n - k, 2]));
    let mut superdiag = ArrayD::<f32>::zeros(IxDyn(&[n - k, 2]));
    for i in 0..n {
        let j = i % (2 * k);
        let value = if j < k {
            Complex64::new(scale, 0.0)
        } else {
            -twiddle(j - k, k, sign) * scale
        };
        set_entry(&mut diag, i, value);
    }
    for r in 0..n - k {
        let j = r % (2 * k);
        if j < k {
            set_entry(&mut superdiag, r, Complex64::new(scale, 0.0));
            set_entry(&mut subdiag, r, twiddle(j, k, sign) * scale);
        }
    }
    Butterfly::from_params(n, k, true, diag, subdiag, superdiag)
}

fn dft(n: usize, normalized: bool, br_first: bool, inverse: bool) -> Result<ButterflyProduct> {
    let m = ButterflyProduct::check_size(n)?;
    let sign = if inverse { 1.0 } else { -1.0 };
    // 단계마다 나눠 곱해 전체 스케일이 1/sqrt(n) 또는 1/n이 되게 한다
    let scale = if normalized {
        FRAC_1_SQRT_2
    } else if inverse {
        0.5
    } else {
        1.0
    };
    let factors = if br_first {
        (0..m)
            .rev()
            .map(|i| dit_stage(n, 1 << i, sign, scale))
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..m)
            .map(|i| dif_stage(n, 1 << i, sign, scale))
            .collect::<Result<Vec<_>>>()?
    };
    let reordering = Reordering::BitReversal {
        perm: Permutation::bit_reversal(n, true)?,
        first: br_first,
    };
    log::debug!(
        "{}: n={}, normalized={}, br_first={}",
        if inverse { "ifft" } else { "fft" },
        n,
        normalized,
        br_first
    );
    ButterflyProduct::from_factors(factors, true, reordering)
}

/// 크기 n의 이산 푸리에 변환
///
/// `normalized`면 1/sqrt(n) 스케일, `br_first`면 비트 반전을 버터플라이 단계
/// 이전에(시간 솎음), 아니면 이후에(주파수 솎음) 적용한다.
pub fn fft(n: usize, normalized: bool, br_first: bool) -> Result<ButterflyProduct> {
    dft(n, normalized, br_first, false)
}

/// 크기 n의 역 이산 푸리에 변환 (정규화하지 않으면 1/n 스케일)
pub fn ifft(n: usize, normalized: bool, br_first: bool) -> Result<ButterflyProduct> {
    dft(n, normalized, br_first, true)
}

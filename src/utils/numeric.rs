//! 수치 계산 유틸리티 함수들

use crate::config::constants::Constants;
use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension, Zip};

/// 다음 2의 거듭제곱 값 찾기 (v 이상인 최소값)
pub fn next_pow2(v: usize) -> usize {
    v.max(1).next_power_of_two()
}

/// 2의 거듭제곱 여부
pub fn is_pow2(v: usize) -> bool {
    v != 0 && v & (v - 1) == 0
}

/// 2의 거듭제곱인 v의 log2 (그 외에는 None)
pub fn log2_exact(v: usize) -> Option<usize> {
    is_pow2(v).then(|| v.trailing_zeros() as usize)
}

/// 크기 n(2의 거듭제곱)의 비트 반전 순열
pub fn bit_reversal_permutation(n: usize) -> Vec<usize> {
    let bits = n.trailing_zeros();
    if bits == 0 {
        return vec![0; n.min(1)];
    }
    (0..n)
        .map(|i| i.reverse_bits() >> (usize::BITS - bits))
        .collect()
}

/// 주어진 축을 따라 수치 안정적인 log-sum-exp (축은 크기 1로 유지)
pub fn logsumexp_axis(x: &ArrayD<f32>, axis: Axis) -> ArrayD<f32> {
    let max = x.map_axis(axis, |lane| {
        lane.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    });
    let mut out = max.clone();
    Zip::from(&mut out)
        .and(&max)
        .and(x.lanes(axis))
        .for_each(|o, &m, lane| {
            // 모두 -inf인 lane은 -inf 그대로
            if m == f32::NEG_INFINITY {
                *o = m;
            } else {
                *o = m + lane.iter().map(|&v| (v - m).exp()).sum::<f32>().ln();
            }
        });
    out.insert_axis(axis)
}

/// 두 텐서가 허용오차 안에서 같은지 (numpy.allclose와 동일한 규칙)
pub fn allclose_with<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>, rtol: f32, atol: f32) -> bool
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
    D: Dimension,
{
    a.shape() == b.shape()
        && a
            .iter()
            .zip(b.iter())
            .all(|(&x, &y)| (x - y).abs() <= atol + rtol * y.abs())
}

/// 기본 허용오차로 allclose
pub fn allclose<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> bool
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
    D: Dimension,
{
    allclose_with(a, b, Constants::RTOL, Constants::ATOL)
}

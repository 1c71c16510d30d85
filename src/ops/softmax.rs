//! 팩터 선택 확률 함수 (softmax, sparsemax)

use crate::config::SoftmaxFn;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// 행 단위 softmax (온도 적용)
pub fn softmax(logit: ArrayView2<f32>, temperature: f32) -> Array2<f32> {
    let mut prob = logit.mapv(|v| v / temperature);
    for mut row in prob.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    prob
}

/// 1차원 sparsemax: 확률 단체로의 유클리드 사영
fn sparsemax_row(z: ArrayView1<f32>) -> Array1<f32> {
    let mut sorted: Vec<f32> = z.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumsum = 0.0f32;
    let mut support = 0usize;
    let mut support_sum = 0.0f32;
    for (i, &v) in sorted.iter().enumerate() {
        if v == f32::NEG_INFINITY {
            break;
        }
        cumsum += v;
        let k = (i + 1) as f32;
        if 1.0 + k * v > cumsum {
            support = i + 1;
            support_sum = cumsum;
        }
    }
    if support == 0 {
        // 유한한 원소가 없는 경우
        return Array1::from_elem(z.len(), f32::NAN);
    }
    let tau = (support_sum - 1.0) / support as f32;
    z.mapv(|v| (v - tau).max(0.0))
}

/// 행 단위 sparsemax (온도 적용). 일부 후보에 정확히 0 확률을 줄 수 있다.
pub fn sparsemax(logit: ArrayView2<f32>, temperature: f32) -> Array2<f32> {
    let scaled = logit.mapv(|v| v / temperature);
    let mut prob = Array2::zeros(scaled.raw_dim());
    for (mut out, row) in prob.axis_iter_mut(Axis(0)).zip(scaled.axis_iter(Axis(0))) {
        out.assign(&sparsemax_row(row));
    }
    prob
}

/// 선택 함수에 따라 확률 행렬 계산
pub fn selection_probs(logit: ArrayView2<f32>, temperature: f32, softmax_fn: SoftmaxFn) -> Array2<f32> {
    match softmax_fn {
        SoftmaxFn::Softmax => softmax(logit, temperature),
        SoftmaxFn::Sparsemax => sparsemax(logit, temperature),
    }
}

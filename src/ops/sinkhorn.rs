//! Sinkhorn 정규화: 임의의 정사각 logit 행렬을 근사 이중 확률 행렬로 변환

use crate::error::{ButterflyError, Result};
use crate::utils::numeric::logsumexp_axis;
use ndarray::{ArrayD, ArrayViewD, Axis, Ix3, IxDyn};

#[cfg(feature = "parallel")]
use ndarray::parallel::prelude::*;

/// Sinkhorn 반복
///
/// logit: (..., n, n). 로그 공간에서 행 방향, 열 방향 log-sum-exp를
/// 번갈아 빼고 마지막에 지수화한다. 반복 횟수가 유한하면 행/열 합은
/// 근사적으로만 1이며, 결과를 순열로 반올림하지 않는다.
pub fn sinkhorn(logit: ArrayViewD<f32>, n_iters: usize) -> Result<ArrayD<f32>> {
    let shape = logit.shape().to_vec();
    let ndim = shape.len();
    if ndim < 2 || shape[ndim - 1] != shape[ndim - 2] {
        return Err(ButterflyError::NotSquare(shape));
    }
    let n = shape[ndim - 1];
    let batch: usize = shape[..ndim - 2].iter().product();

    let mut stacked = ArrayD::from_shape_vec(IxDyn(&[batch, n, n]), logit.iter().copied().collect())?
        .into_dimensionality::<Ix3>()?;

    #[cfg(feature = "parallel")]
    let iter = stacked.axis_iter_mut(Axis(0)).into_par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = stacked.axis_iter_mut(Axis(0));

    iter.for_each(|mut matrix| {
        let mut log_p = matrix.to_owned().into_dyn();
        for it in 0..n_iters {
            log_p = &log_p - &logsumexp_axis(&log_p, Axis(1));
            log_p = &log_p - &logsumexp_axis(&log_p, Axis(0));
            log::trace!("sinkhorn iteration {}/{}", it + 1, n_iters);
        }
        log_p.mapv_inplace(f32::exp);
        matrix.assign(&log_p);
    });

    Ok(stacked.into_shape(IxDyn(&shape))?)
}

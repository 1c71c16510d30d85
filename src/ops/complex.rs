//! 복소 연산 어댑터
//!
//! 복소 텐서는 마지막 축이 (실수부, 허수부) 쌍인 실수 텐서로 표현한다.
//! `(..., 2)` 형태를 유지한 채로 원소별 곱과 행렬 곱을 계산한다.

use crate::error::{ButterflyError, Result};
use ndarray::{stack, Array2, Array4, ArrayD, ArrayView2, ArrayViewD, Axis, Ix2, Ix3, IxDyn};

/// 마지막 축의 크기가 2인지 확인
pub fn check_complex(shape: &[usize]) -> Result<()> {
    match shape.last() {
        Some(2) => Ok(()),
        _ => Err(ButterflyError::NotComplex(shape.to_vec())),
    }
}

/// numpy 규칙의 브로드캐스트 결과 shape
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let db = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        shape[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(ButterflyError::IncompatibleShapes(a.to_vec(), b.to_vec())),
        };
    }
    Ok(shape)
}

fn broadcast_pair<'a, 'b, 'c>(
    a: &'a ArrayViewD<'b, f32>,
    b: &'a ArrayViewD<'c, f32>,
) -> Result<(ArrayViewD<'a, f32>, ArrayViewD<'a, f32>)> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let incompatible = || ButterflyError::IncompatibleShapes(a.shape().to_vec(), b.shape().to_vec());
    let a_b = a.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    let b_b = b.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    Ok((a_b, b_b))
}

/// 원소별 복소 곱: (ar*br − ai*bi, ar*bi + ai*br)
pub fn complex_mul(a: ArrayViewD<f32>, b: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
    check_complex(a.shape())?;
    check_complex(b.shape())?;
    let (a, b) = broadcast_pair(&a, &b)?;
    let last = Axis(a.ndim() - 1);
    let (ar, ai) = (a.index_axis(last, 0), a.index_axis(last, 1));
    let (br, bi) = (b.index_axis(last, 0), b.index_axis(last, 1));
    let re = &ar * &br - &ai * &bi;
    let im = &ar * &bi + &ai * &br;
    Ok(stack(last, &[re.view(), im.view()])?)
}

/// 원소별 실수 곱 (브로드캐스트 불가 시 오류)
pub fn real_mul(a: ArrayViewD<f32>, b: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
    let (a, b) = broadcast_pair(&a, &b)?;
    Ok(&a * &b)
}

/// 실수/복소 원소별 곱 선택
pub fn mul_op(a: ArrayViewD<f32>, b: ArrayViewD<f32>, complex: bool) -> Result<ArrayD<f32>> {
    if complex {
        complex_mul(a, b)
    } else {
        real_mul(a, b)
    }
}

/// 복소 켤레
pub fn complex_conj(a: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
    check_complex(a.shape())?;
    let mut out = a.to_owned();
    let last = Axis(out.ndim() - 1);
    out.index_axis_mut(last, 1).mapv_inplace(|v| -v);
    Ok(out)
}

/// 배치 행렬 곱: 마지막 두 축(복소는 쌍 축 앞의 두 축)이 행렬이고
/// 그 앞의 축들은 numpy 규칙으로 브로드캐스트한다
fn batched_matmul(a: ArrayViewD<f32>, b: ArrayViewD<f32>, complex: bool) -> Result<ArrayD<f32>> {
    let incompatible = || ButterflyError::IncompatibleShapes(a.shape().to_vec(), b.shape().to_vec());
    let trailing = if complex { 3 } else { 2 };
    if a.ndim() < trailing || b.ndim() < trailing {
        return Err(incompatible());
    }
    let (a_lead, a_mat) = a.shape().split_at(a.ndim() - trailing);
    let (b_lead, b_mat) = b.shape().split_at(b.ndim() - trailing);
    let (m, k, p) = (a_mat[0], a_mat[1], b_mat[1]);
    if k != b_mat[0] {
        return Err(incompatible());
    }
    let lead = broadcast_shape(a_lead, b_lead)?;
    let batch: usize = lead.iter().product();
    let inner = if complex { 2 } else { 1 };

    let mut a_shape = lead.clone();
    a_shape.extend_from_slice(a_mat);
    let mut b_shape = lead.clone();
    b_shape.extend_from_slice(b_mat);
    let a_b = a.broadcast(IxDyn(&a_shape)).ok_or_else(incompatible)?;
    let b_b = b.broadcast(IxDyn(&b_shape)).ok_or_else(incompatible)?;
    let a_flat = Array4::from_shape_vec((batch, m, k, inner), a_b.iter().copied().collect())?;
    let b_flat = Array4::from_shape_vec((batch, k, p, inner), b_b.iter().copied().collect())?;

    let mut out = Array4::<f32>::zeros((batch, m, p, inner));
    for (i, mut o) in out.outer_iter_mut().enumerate() {
        let (x, y) = (a_flat.index_axis(Axis(0), i), b_flat.index_axis(Axis(0), i));
        if complex {
            let (re, im) = complex_dot(
                x.index_axis(Axis(2), 0),
                x.index_axis(Axis(2), 1),
                y.index_axis(Axis(2), 0),
                y.index_axis(Axis(2), 1),
            );
            o.index_axis_mut(Axis(2), 0).assign(&re);
            o.index_axis_mut(Axis(2), 1).assign(&im);
        } else {
            let prod = x.index_axis(Axis(2), 0).dot(&y.index_axis(Axis(2), 0));
            o.index_axis_mut(Axis(2), 0).assign(&prod);
        }
    }

    let mut out_shape = lead;
    out_shape.extend_from_slice(&[m, p]);
    if complex {
        out_shape.push(2);
    }
    Ok(out.into_shape(IxDyn(&out_shape))?)
}

/// 실수 행렬 곱: (..., m, k) @ (..., k, p) -> (..., m, p)
pub fn real_matmul(a: ArrayViewD<f32>, b: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
    batched_matmul(a, b, false)
}

/// 복소 행렬 곱: (..., m, k, 2) @ (..., k, p, 2) -> (..., m, p, 2)
pub fn complex_matmul(a: ArrayViewD<f32>, b: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
    check_complex(a.shape())?;
    check_complex(b.shape())?;
    batched_matmul(a, b, true)
}

fn complex_dot(
    ar: ArrayView2<f32>,
    ai: ArrayView2<f32>,
    br: ArrayView2<f32>,
    bi: ArrayView2<f32>,
) -> (Array2<f32>, Array2<f32>) {
    let re = ar.dot(&br) - ai.dot(&bi);
    let im = ar.dot(&bi) + ai.dot(&br);
    (re, im)
}

/// 실수/복소 행렬 곱 선택
pub fn matmul_op(a: ArrayViewD<f32>, b: ArrayViewD<f32>, complex: bool) -> Result<ArrayD<f32>> {
    if complex {
        complex_matmul(a, b)
    } else {
        real_matmul(a, b)
    }
}

/// 밀집 행렬을 벡터 배치에 적용: `input @ matrix^T`
///
/// input: (..., n) 또는 (..., n, 2), matrix: (m, n) 또는 (m, n, 2).
/// 결과: (..., m) 또는 (..., m, 2).
pub fn apply_dense(input: ArrayViewD<f32>, matrix: ArrayViewD<f32>, complex: bool) -> Result<ArrayD<f32>> {
    let inner = if complex { 2 } else { 1 };
    let mat_ndim = if complex { 3 } else { 2 };
    if complex {
        check_complex(input.shape())?;
        check_complex(matrix.shape())?;
    }
    if matrix.ndim() != mat_ndim || input.ndim() < inner {
        return Err(ButterflyError::IncompatibleShapes(input.shape().to_vec(), matrix.shape().to_vec()));
    }
    let (rows, cols) = (matrix.shape()[0], matrix.shape()[1]);
    let n_axis = input.ndim() - inner;
    if input.shape()[n_axis] != cols {
        return Err(ButterflyError::IncompatibleShapes(input.shape().to_vec(), matrix.shape().to_vec()));
    }
    let lead = &input.shape()[..n_axis];
    let batch: usize = lead.iter().product();

    let flat = ArrayD::from_shape_vec(
        IxDyn(&[batch, cols, inner]),
        input.iter().copied().collect(),
    )?;
    let flat = flat.into_dimensionality::<Ix3>()?;
    let mut out_shape = lead.to_vec();
    out_shape.push(rows);

    if !complex {
        let x = flat.index_axis(Axis(2), 0);
        let m = matrix.view().into_dimensionality::<Ix2>()?;
        let y = x.dot(&m.t());
        return Ok(y.into_shape(IxDyn(&out_shape))?);
    }

    let m = matrix.view().into_dimensionality::<Ix3>()?;
    let (xr, xi) = (flat.index_axis(Axis(2), 0), flat.index_axis(Axis(2), 1));
    let (mr, mi) = (m.index_axis(Axis(2), 0), m.index_axis(Axis(2), 1));
    let (re, im) = complex_dot(xr, xi, mr.t(), mi.t());
    out_shape.push(2);
    let y = stack(Axis(2), &[re.view(), im.view()])?;
    Ok(y.into_shape(IxDyn(&out_shape))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::numeric::allclose;
    use ndarray::{array, Array3};

    #[test]
    fn complex_mul_follows_complex_rule() {
        let a = array![[1.0f32, 2.0], [0.0, 1.0]].into_dyn();
        let b = array![[3.0f32, -1.0], [0.0, 1.0]].into_dyn();
        let c = complex_mul(a.view(), b.view()).unwrap();
        // (1+2i)(3-i) = 5+5i, i*i = -1
        assert!(allclose(&c, &array![[5.0f32, 5.0], [-1.0, 0.0]].into_dyn()));
    }

    #[test]
    fn complex_mul_broadcasts_leading_axes() {
        let a = Array3::<f32>::ones((3, 4, 2)).into_dyn();
        let b = array![[1.0f32, 0.0], [0.0, 1.0], [2.0, 0.0], [0.0, 0.0]].into_dyn();
        let c = complex_mul(a.view(), b.view()).unwrap();
        assert_eq!(c.shape(), &[3, 4, 2]);
        assert!(allclose(
            &c.index_axis(Axis(0), 2).to_owned(),
            &array![[1.0f32, 1.0], [-1.0, 1.0], [2.0, 2.0], [0.0, 0.0]].into_dyn()
        ));
    }

    #[test]
    fn complex_ops_reject_missing_pair_axis() {
        let a = array![[1.0f32, 2.0, 3.0]].into_dyn();
        assert!(matches!(
            complex_mul(a.view(), a.view()),
            Err(ButterflyError::NotComplex(_))
        ));
        let b = Array3::<f32>::zeros((2, 3, 2)).into_dyn();
        let c = Array3::<f32>::zeros((4, 3, 2)).into_dyn();
        assert!(matches!(
            complex_mul(b.view(), c.view()),
            Err(ButterflyError::IncompatibleShapes(_, _))
        ));
    }

    #[test]
    fn complex_matmul_matches_separate_real_products() {
        // A = [[1+i, 2], [0, i]], B = [[1, i], [1, 1]]
        let a = array![[[1.0f32, 1.0], [2.0, 0.0]], [[0.0, 0.0], [0.0, 1.0]]].into_dyn();
        let b = array![[[1.0f32, 0.0], [0.0, 1.0]], [[1.0, 0.0], [1.0, 0.0]]].into_dyn();
        let c = complex_matmul(a.view(), b.view()).unwrap();
        // row0: [(1+i)+2, (1+i)i+2] = [3+i, 1+i]; row1: [i, i]
        let expected = array![[[3.0f32, 1.0], [1.0, 1.0]], [[0.0, 1.0], [0.0, 1.0]]].into_dyn();
        assert!(allclose(&c, &expected));
    }

    #[test]
    fn apply_dense_is_input_times_matrix_transpose() {
        let m = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn();
        let x = array![[[1.0f32, 0.0]], [[0.0, 1.0]]].into_dyn();
        let y = apply_dense(x.view(), m.view(), false).unwrap();
        assert_eq!(y.shape(), &[2, 1, 3]);
        assert!(allclose(&y, &array![[[1.0f32, 3.0, 5.0]], [[2.0, 4.0, 6.0]]].into_dyn()));
    }

    #[test]
    fn complex_conj_negates_imaginary_part() {
        let a = array![[1.0f32, 2.0], [-3.0, -4.0]].into_dyn();
        let c = complex_conj(a.view()).unwrap();
        assert!(allclose(&c, &array![[1.0f32, -2.0], [-3.0, 4.0]].into_dyn()));
    }

    #[test]
    fn matmul_broadcasts_batch_axes() {
        let a = ArrayD::from_shape_fn(IxDyn(&[3, 2, 4, 2]), |idx| (idx[0] + 2 * idx[1] + 3 * idx[2] + idx[3]) as f32 * 0.1);
        let b = ArrayD::from_shape_fn(IxDyn(&[4, 4, 2]), |idx| (idx[0] as f32 - idx[1] as f32) * 0.2 + idx[2] as f32);
        let c = complex_matmul(a.view(), b.view()).unwrap();
        assert_eq!(c.shape(), &[3, 2, 4, 2]);
        for i in 0..3 {
            let single = complex_matmul(a.index_axis(Axis(0), i), b.view()).unwrap();
            assert!(allclose(&c.index_axis(Axis(0), i).to_owned(), &single));
        }

        let x = ArrayD::from_shape_fn(IxDyn(&[2, 1, 3, 4]), |idx| (idx[0] * 5 + idx[2] * 2 + idx[3]) as f32);
        let y = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |idx| (idx[0] + idx[1] * idx[2]) as f32 * 0.5);
        let z = real_matmul(x.view(), y.view()).unwrap();
        assert_eq!(z.shape(), &[2, 3, 3, 5]);
        let x2 = x.index_axis(Axis(0), 1).index_axis(Axis(0), 0).to_owned().into_dimensionality::<Ix2>().unwrap();
        let y2 = y.index_axis(Axis(0), 2).to_owned().into_dimensionality::<Ix2>().unwrap();
        let expected = x2.dot(&y2).into_dyn();
        assert!(allclose(&z.index_axis(Axis(0), 1).index_axis(Axis(0), 2).to_owned(), &expected));

        let bad = ArrayD::<f32>::zeros(IxDyn(&[2, 5, 5]));
        assert!(matches!(
            real_matmul(x.view(), bad.view()),
            Err(ButterflyError::IncompatibleShapes(_, _))
        ));
    }
}

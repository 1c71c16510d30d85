//! 파이썬 바인딩 (pyo3 / numpy)

use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{Constants, ProductConfig};
use crate::error::ButterflyError;
use crate::factors::{Butterfly, Factor};
use crate::layers::ButterflyProduct;
use crate::special::Circulant;

impl From<ButterflyError> for PyErr {
    fn from(err: ButterflyError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// 단일 버터플라이 팩터
#[pyclass(name = "Butterfly")]
pub struct PyButterfly {
    inner: Butterfly,
}

#[pymethods]
impl PyButterfly {
    #[new]
    #[pyo3(signature = (size, diagonal, complex = false))]
    fn new(size: usize, diagonal: usize, complex: bool) -> PyResult<Self> {
        Ok(PyButterfly {
            inner: Butterfly::new(size, diagonal, complex)?,
        })
    }

    #[getter]
    fn size(&self) -> usize {
        self.inner.size()
    }

    #[getter]
    fn diagonal(&self) -> usize {
        self.inner.diagonal()
    }

    fn matrix<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArrayDyn<f32>> {
        Ok(self.inner.matrix(Constants::DEFAULT_TEMPERATURE)?.into_pyarray(py))
    }

    fn forward<'py>(&self, py: Python<'py>, input: PyReadonlyArrayDyn<f32>) -> PyResult<&'py PyArrayDyn<f32>> {
        let input = input.as_array().to_owned();
        Ok(self.inner.forward(&input, Constants::DEFAULT_TEMPERATURE)?.into_pyarray(py))
    }
}

/// 학습 가능한 버터플라이 곱
#[pyclass(name = "ButterflyProduct")]
pub struct PyButterflyProduct {
    inner: ButterflyProduct,
}

#[pymethods]
impl PyButterflyProduct {
    #[new]
    #[pyo3(signature = (size, complex = false, fixed_order = false, softmax_fn = "softmax", learn_perm = false))]
    fn new(size: usize, complex: bool, fixed_order: bool, softmax_fn: &str, learn_perm: bool) -> PyResult<Self> {
        let config = ProductConfig::new()
            .complex(complex)
            .fixed_order(fixed_order)
            .learn_perm(learn_perm)
            .softmax_fn_name(softmax_fn)?;
        Ok(PyButterflyProduct {
            inner: ButterflyProduct::new(size, &config)?,
        })
    }

    #[getter]
    fn size(&self) -> usize {
        self.inner.size()
    }

    #[pyo3(signature = (temperature = Constants::DEFAULT_TEMPERATURE))]
    fn matrix<'py>(&self, py: Python<'py>, temperature: f32) -> PyResult<&'py PyArrayDyn<f32>> {
        Ok(self.inner.matrix(temperature)?.into_pyarray(py))
    }

    #[pyo3(signature = (input, temperature = Constants::DEFAULT_TEMPERATURE))]
    fn forward<'py>(
        &self,
        py: Python<'py>,
        input: PyReadonlyArrayDyn<f32>,
        temperature: f32,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let input = input.as_array().to_owned();
        Ok(self.inner.forward(&input, temperature)?.into_pyarray(py))
    }
}

/// 원형 행렬 곱 연산자
#[pyclass(name = "Circulant")]
pub struct PyCirculant {
    inner: Circulant,
}

#[pymethods]
impl PyCirculant {
    fn matrix<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArrayDyn<f32>> {
        Ok(self.inner.matrix(Constants::DEFAULT_TEMPERATURE)?.into_pyarray(py))
    }

    fn forward<'py>(&self, py: Python<'py>, input: PyReadonlyArrayDyn<f32>) -> PyResult<&'py PyArrayDyn<f32>> {
        let input = input.as_array().to_owned();
        Ok(self.inner.forward(&input, Constants::DEFAULT_TEMPERATURE)?.into_pyarray(py))
    }
}

#[pyfunction]
#[pyo3(signature = (logit, n_iters = Constants::DEFAULT_SINKHORN_ITERS))]
fn sinkhorn<'py>(py: Python<'py>, logit: PyReadonlyArrayDyn<f32>, n_iters: usize) -> PyResult<&'py PyArrayDyn<f32>> {
    Ok(crate::ops::sinkhorn(logit.as_array(), n_iters)?.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (n, normalized = false, br_first = true))]
fn fft(n: usize, normalized: bool, br_first: bool) -> PyResult<PyButterflyProduct> {
    Ok(PyButterflyProduct {
        inner: crate::special::fft(n, normalized, br_first)?,
    })
}

#[pyfunction]
#[pyo3(signature = (n, normalized = false, br_first = true))]
fn ifft(n: usize, normalized: bool, br_first: bool) -> PyResult<PyButterflyProduct> {
    Ok(PyButterflyProduct {
        inner: crate::special::ifft(n, normalized, br_first)?,
    })
}

#[pyfunction]
#[pyo3(signature = (col, transposed = false, separate_diagonal = true))]
fn circulant(col: PyReadonlyArrayDyn<f32>, transposed: bool, separate_diagonal: bool) -> PyResult<PyCirculant> {
    let col = col.as_array().to_owned();
    Ok(PyCirculant {
        inner: crate::special::circulant(&col, transposed, separate_diagonal)?,
    })
}

#[pymodule]
fn butterfly_stone(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyButterfly>()?;
    m.add_class::<PyButterflyProduct>()?;
    m.add_class::<PyCirculant>()?;
    m.add_function(wrap_pyfunction!(sinkhorn, m)?)?;
    m.add_function(wrap_pyfunction!(fft, m)?)?;
    m.add_function(wrap_pyfunction!(ifft, m)?)?;
    m.add_function(wrap_pyfunction!(circulant, m)?)?;
    Ok(())
}

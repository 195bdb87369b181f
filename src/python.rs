use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::backend::BackendConfig;
use crate::config::SkymaskConfig;
use crate::error::{PositionError, SkymaskError};
use crate::geometry::lines_from_array;
use crate::profile::SkyMask;
use crate::world::{compute_profile as compute_profile_pure, ProfileRunner, World};

fn py_err(source: &SkymaskError, message: String) -> PyErr {
    match source {
        SkymaskError::InvalidInput(_) | SkymaskError::Config(_) => PyValueError::new_err(message),
        SkymaskError::IndexUnavailable(_) | SkymaskError::Cancelled => {
            PyRuntimeError::new_err(message)
        }
    }
}

impl From<SkymaskError> for PyErr {
    fn from(e: SkymaskError) -> Self {
        py_err(&e, e.to_string())
    }
}

// keeps the position index in the message
impl From<PositionError> for PyErr {
    fn from(e: PositionError) -> Self {
        py_err(&e.source, e.to_string())
    }
}

type ProfilePair<'py> = (Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>);

fn observers_from_array(poss: PyReadonlyArray2<f64>) -> PyResult<Vec<[f64; 2]>> {
    let view = poss.as_array();
    if view.ncols() != 2 {
        return Err(PyValueError::new_err(format!(
            "positions must have 2 columns, got {}",
            view.ncols()
        )));
    }
    Ok(view.outer_iter().map(|r| [r[0], r[1]]).collect())
}

#[pyclass(name = "World")]
pub struct PyWorld {
    inner: World,
}

#[pymethods]
impl PyWorld {
    /// `lines` is an (n, 6) array of `x1, y1, z1, x2, y2, z2` rows.
    #[new]
    #[pyo3(signature = (lines, max_dist=None, eps=0.0, parallel=false, threads=None))]
    fn new(
        py: Python,
        lines: PyReadonlyArray2<f64>,
        max_dist: Option<f64>,
        eps: f64,
        parallel: bool,
        threads: Option<usize>,
    ) -> PyResult<Self> {
        let lines = lines_from_array(lines.as_array())?;
        let config = SkymaskConfig {
            max_distance: max_dist,
            degeneracy_epsilon: eps,
            backend: if parallel {
                BackendConfig::parallel()
            } else {
                BackendConfig::vectorized()
            },
            threads,
            ..Default::default()
        };
        let inner = py.allow_threads(|| World::new(lines, config))?;
        Ok(Self { inner })
    }

    #[getter]
    fn lines<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.inner.lines_array().into_pyarray(py)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn skymask(&self, py: Python, pos: (f64, f64)) -> PyResult<PySkyMask> {
        let inner = py.allow_threads(|| self.inner.skymask([pos.0, pos.1]))?;
        Ok(PySkyMask { inner })
    }

    /// Returns `(alpha_1, alpha_2)` for half-circle samples `theta`.
    fn profile<'py>(
        &self,
        py: Python<'py>,
        pos: (f64, f64),
        theta: PyReadonlyArray1<f64>,
    ) -> PyResult<ProfilePair<'py>> {
        let theta = theta.as_array().to_owned();
        let p = py.allow_threads(|| self.inner.profile([pos.0, pos.1], theta.view()))?;
        Ok((p.alpha_1.into_pyarray(py), p.alpha_2.into_pyarray(py)))
    }

    /// Elevations at azimuths `x` for every position in `poss` (shape (k, 2)).
    fn par_samples<'py>(
        &self,
        py: Python<'py>,
        poss: PyReadonlyArray2<f64>,
        x: PyReadonlyArray1<f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let observers = observers_from_array(poss)?;
        let x = x.as_array().to_owned();
        let out = py.allow_threads(|| self.inner.par_samples(&observers, x.view()))?;
        Ok(out.into_pyarray(py))
    }
}

#[pyclass(name = "SkyMask")]
pub struct PySkyMask {
    inner: SkyMask,
}

#[pymethods]
impl PySkyMask {
    #[getter]
    fn num_candidates(&self) -> usize {
        self.inner.num_candidates()
    }

    /// Elevation toward each azimuth in `x`, any real angle.
    fn samples<'py>(
        &self,
        py: Python<'py>,
        x: PyReadonlyArray1<f64>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let x = x.as_array().to_owned();
        let out = py.allow_threads(|| self.inner.samples(x.view()))?;
        Ok(out.into_pyarray(py))
    }

    /// Full-circle `(azimuths, elevations)` built from half-circle samples.
    fn polar<'py>(
        &self,
        py: Python<'py>,
        theta: PyReadonlyArray1<f64>,
    ) -> PyResult<ProfilePair<'py>> {
        let profile = self.inner.profile(theta.as_array())?;
        let (az, el) = profile.polar();
        Ok((az.into_pyarray(py), el.into_pyarray(py)))
    }

    fn sky_view_factor(&self, theta: PyReadonlyArray1<f64>) -> PyResult<f64> {
        Ok(self.inner.profile(theta.as_array())?.sky_view_factor())
    }

    fn max_elevation(&self, theta: PyReadonlyArray1<f64>) -> PyResult<f64> {
        Ok(self.inner.profile(theta.as_array())?.max_elevation())
    }
}

/// Batch runner exposing `progress()` and `cancel()` while `run` executes
/// without the GIL.
#[pyclass(name = "ProfileRunner")]
pub struct PyProfileRunner {
    inner: ProfileRunner,
}

#[pymethods]
impl PyProfileRunner {
    #[new]
    fn new() -> Self {
        Self {
            inner: ProfileRunner::new(),
        }
    }

    fn progress(&self) -> usize {
        self.inner.progress()
    }

    fn cancel(&self) {
        self.inner.cancel()
    }

    fn reset(&self) {
        self.inner.reset()
    }

    /// Returns `(profiles, errors)`. `profiles` holds one `(alpha_1, alpha_2)`
    /// tuple per position, `None` where it failed; `errors` lists
    /// `(index, kind, message)` for every failed position.
    #[allow(clippy::type_complexity)]
    fn run<'py>(
        &self,
        py: Python<'py>,
        world: &PyWorld,
        poss: PyReadonlyArray2<f64>,
        theta: PyReadonlyArray1<f64>,
    ) -> PyResult<(Vec<Option<ProfilePair<'py>>>, Vec<(usize, &'static str, String)>)> {
        let observers = observers_from_array(poss)?;
        let theta = theta.as_array().to_owned();
        let batch = py.allow_threads(|| self.inner.run(&world.inner, &observers, theta.view()));
        let errors = batch
            .failures()
            .into_iter()
            .map(|f| (f.index, f.source.kind(), f.source.to_string()))
            .collect();
        let profiles = batch
            .results
            .into_iter()
            .map(|r| {
                r.ok()
                    .map(|p| (p.alpha_1.into_pyarray(py), p.alpha_2.into_pyarray(py)))
            })
            .collect();
        Ok((profiles, errors))
    }
}

#[pyfunction]
#[pyo3(signature = (lines, pos, theta, max_dist=None))]
pub fn compute_profile<'py>(
    py: Python<'py>,
    lines: PyReadonlyArray2<f64>,
    pos: (f64, f64),
    theta: PyReadonlyArray1<f64>,
    max_dist: Option<f64>,
) -> PyResult<ProfilePair<'py>> {
    let lines = lines_from_array(lines.as_array())?;
    let theta = theta.as_array().to_vec();
    let p = py.allow_threads(|| {
        compute_profile_pure(
            &lines,
            [pos.0, pos.1],
            &theta,
            max_dist.unwrap_or(f64::INFINITY),
        )
    })?;
    Ok((p.alpha_1.into_pyarray(py), p.alpha_2.into_pyarray(py)))
}
